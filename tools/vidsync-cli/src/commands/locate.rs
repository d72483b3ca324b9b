//! Find the first frame of a video showing a marker.

use std::path::PathBuf;

use anyhow::Context;
use vidsync_common::config::AppConfig;
use vidsync_core::artifacts::NullArtifactSink;
use vidsync_core::marker::MarkerReader;
use vidsync_core::pipeline::locate_marker;
use vidsync_core::scan::ScanContext;
use vidsync_media::{FfmpegVideoOpener, TesseractRecognizer};
use vidsync_model::event::{EventLog, Stage};

pub fn run(
    config: &AppConfig,
    video: PathBuf,
    marker: u64,
    window: Option<f64>,
) -> anyhow::Result<()> {
    let opener = FfmpegVideoOpener::from_tools(&config.tools);
    let mut reader = MarkerReader::new(Box::new(TesseractRecognizer::from_tools(&config.tools)));
    let mut events = EventLog::new();
    let window_secs = window.unwrap_or(config.sync.locate_window_secs);

    let offset = {
        let mut scan = ScanContext::new(&mut reader, &mut events, &NullArtifactSink);
        locate_marker(&opener, &mut scan, &video, marker, window_secs)
            .with_context(|| format!("Failed to scan {}", video.display()))?
    };
    let scanned = events.frames_scanned(Stage::ReferenceLocate);

    println!("Video: {}", video.display());
    match offset {
        Some(offset) => {
            println!(
                "  Marker {marker} found at frame {}",
                offset.reference_frame.unwrap_or_default()
            );
            println!("  Offset: {:.6}s", offset.seconds);
            println!("  Frames scanned: {scanned}");
            Ok(())
        }
        None => {
            println!("  Frames scanned: {scanned}");
            anyhow::bail!("Marker {marker} not found in the first {window_secs}s")
        }
    }
}
