//! Find the sync point of a single video.

use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use vidsync_common::config::AppConfig;
use vidsync_core::artifacts::NullArtifactSink;
use vidsync_core::marker::MarkerReader;
use vidsync_core::pipeline::{find_sync_point, SyncSettings};
use vidsync_core::scan::ScanContext;
use vidsync_media::{FfmpegVideoOpener, TesseractRecognizer};
use vidsync_model::event::{EventLog, Stage};
use vidsync_model::sync::SyncPoint;

#[derive(Debug, Serialize)]
struct SyncOutput<'a> {
    video: &'a PathBuf,
    sync: SyncPoint,
    frames_scanned: usize,
    fallback_frames_scanned: usize,
}

pub fn run(config: &AppConfig, video: PathBuf, seek: f64, json: bool) -> anyhow::Result<()> {
    let opener = FfmpegVideoOpener::from_tools(&config.tools);
    let mut reader = MarkerReader::new(Box::new(TesseractRecognizer::from_tools(&config.tools)));
    let mut events = EventLog::new();
    let settings = SyncSettings::from(&config.sync);

    let sync = {
        let mut scan = ScanContext::new(&mut reader, &mut events, &NullArtifactSink);
        find_sync_point(&opener, &mut scan, &video, seek, &settings)
            .with_context(|| format!("Failed to scan {}", video.display()))?
    };

    let output = SyncOutput {
        video: &video,
        sync,
        frames_scanned: events.frames_scanned(Stage::SyncSearch),
        fallback_frames_scanned: events.frames_scanned(Stage::FallbackDifference),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Video: {}", video.display());
    println!(
        "  Sync point: frame {} at {:.3}s",
        sync.frame_index, sync.timestamp_secs
    );
    println!("  Method: {}", sync.method);
    println!(
        "  Frames scanned: {} (fallback: {})",
        output.frames_scanned, output.fallback_frames_scanned
    );
    Ok(())
}
