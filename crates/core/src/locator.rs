//! Reference frame localization.
//!
//! Finds the first frame of a stream whose marker equals a target. The scan
//! is linear from the start of the stream: markers are not guaranteed to be
//! monotonic across encode boundaries, so nothing may be skipped.

use image::DynamicImage;
use vidsync_common::error::VidsyncResult;
use vidsync_model::event::{EventKind, Stage, SyncEvent};

use crate::artifacts::persist;
use crate::frame::{Frame, FrameSource};
use crate::scan::ScanContext;

/// Bounded linear search for a marker value.
pub struct FrameLocator {
    window_secs: f64,
}

impl Default for FrameLocator {
    fn default() -> Self {
        Self::new(60.0)
    }
}

impl FrameLocator {
    pub fn new(window_secs: f64) -> Self {
        Self { window_secs }
    }

    /// Index of the first frame showing `target`, within the window.
    ///
    /// Any exact marker match counts regardless of confidence.
    pub fn locate(
        &self,
        source: &mut dyn FrameSource,
        scan: &mut ScanContext<'_>,
        target: u64,
    ) -> VidsyncResult<Option<u64>> {
        Ok(self
            .locate_frame(source, scan, target)?
            .map(|frame| frame.index))
    }

    /// Like [`FrameLocator::locate`], returning the matching frame itself.
    pub fn locate_frame(
        &self,
        source: &mut dyn FrameSource,
        scan: &mut ScanContext<'_>,
        target: u64,
    ) -> VidsyncResult<Option<Frame>> {
        let window = source.info().clock.window_frames(self.window_secs);
        source.seek(0)?;
        tracing::info!(target, window_frames = window, "Searching reference for marker");

        let mut scanned = 0u64;
        while scanned < window {
            let Some(frame) = source.next_frame()? else {
                break;
            };
            scanned += 1;

            let detection = scan.reader.detect(&frame.image);
            tracing::info!(
                frame = frame.index,
                secs = frame.timestamp_secs,
                detection = %detection,
                "Scanned reference frame"
            );
            scan.events.push(SyncEvent::frame(
                Stage::ReferenceLocate,
                frame.index,
                frame.timestamp_secs,
                Some(detection),
                EventKind::FrameScanned,
            ));

            if detection.marker == Some(target) {
                tracing::info!(
                    target,
                    frame = frame.index,
                    secs = frame.timestamp_secs,
                    "Found target marker"
                );
                scan.events.push(SyncEvent::frame(
                    Stage::ReferenceLocate,
                    frame.index,
                    frame.timestamp_secs,
                    None,
                    EventKind::MarkerLocated { marker: target },
                ));
                persist(
                    scan.artifacts,
                    &format!("reference_frame_{target}_at_position_{}.png", frame.index),
                    DynamicImage::ImageRgb8(frame.image.clone()),
                );
                return Ok(Some(frame));
            }
        }

        tracing::warn!(
            target,
            frames_scanned = scanned,
            window_secs = self.window_secs,
            "Target marker not found in reference window"
        );
        scan.events.push(SyncEvent::stage(
            Stage::ReferenceLocate,
            EventKind::WindowExhausted {
                frames_scanned: scanned,
            },
        ));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactSink, NullArtifactSink};
    use crate::marker::MarkerReader;
    use crate::synthetic::{PixelCodeRecognizer, SyntheticFrame, SyntheticVideo};
    use std::cell::RefCell;
    use std::path::PathBuf;
    use vidsync_common::error::VidsyncResult;
    use vidsync_model::event::EventLog;

    fn reference(count: u64) -> SyntheticVideo {
        let frames: Vec<_> = (1..=count)
            .map(|m| SyntheticFrame::marker(m, 0.3))
            .collect();
        SyntheticVideo::new(30.0, &frames).unwrap()
    }

    fn locate(
        locator: &FrameLocator,
        video: &mut SyntheticVideo,
        target: u64,
        events: &mut EventLog,
    ) -> Option<u64> {
        let mut reader = MarkerReader::new(Box::new(PixelCodeRecognizer::new()));
        let sink = NullArtifactSink;
        let mut scan = ScanContext::new(&mut reader, events, &sink);
        locator.locate(video, &mut scan, target).unwrap()
    }

    #[test]
    fn test_finds_first_match_without_confidence_gate() {
        let mut video = reference(300);
        let mut events = EventLog::new();
        let found = locate(&FrameLocator::default(), &mut video, 271, &mut events);
        assert_eq!(found, Some(270));
        assert_eq!(events.frames_scanned(Stage::ReferenceLocate), 271);
    }

    #[test]
    fn test_scan_starts_at_zero_after_seek() {
        let mut video = reference(10);
        video.seek(8).unwrap();
        let mut events = EventLog::new();
        assert_eq!(
            locate(&FrameLocator::default(), &mut video, 2, &mut events),
            Some(1)
        );
    }

    #[test]
    fn test_duplicate_markers_return_first() {
        let frames = vec![
            SyntheticFrame::marker(4, 0.9),
            SyntheticFrame::marker(5, 0.9),
            SyntheticFrame::marker(5, 0.9),
            SyntheticFrame::marker(3, 0.9),
        ];
        let mut video = SyntheticVideo::new(30.0, &frames).unwrap();
        let mut events = EventLog::new();
        assert_eq!(
            locate(&FrameLocator::default(), &mut video, 5, &mut events),
            Some(1)
        );
        assert_eq!(
            locate(&FrameLocator::default(), &mut video, 3, &mut events),
            Some(3)
        );
    }

    #[test]
    fn test_missing_marker_scans_exactly_the_window() {
        let mut video = reference(600);
        let mut events = EventLog::new();
        let found = locate(&FrameLocator::new(2.0), &mut video, 9999, &mut events);
        assert!(found.is_none());
        assert_eq!(events.frames_scanned(Stage::ReferenceLocate), 60);
        assert_eq!(video.position(), 60);
    }

    #[test]
    fn test_match_saves_reference_frame() {
        struct RecordingSink(RefCell<Vec<String>>);

        impl ArtifactSink for RecordingSink {
            fn save_image(
                &self,
                name: &str,
                _image: &DynamicImage,
            ) -> VidsyncResult<Option<PathBuf>> {
                self.0.borrow_mut().push(name.to_string());
                Ok(None)
            }
        }

        let mut video = reference(20);
        let mut reader = MarkerReader::new(Box::new(PixelCodeRecognizer::new()));
        let mut events = EventLog::new();
        let sink = RecordingSink(RefCell::new(Vec::new()));
        let mut scan = ScanContext::new(&mut reader, &mut events, &sink);
        let frame = FrameLocator::default()
            .locate_frame(&mut video, &mut scan, 12)
            .unwrap()
            .unwrap();
        assert_eq!(frame.index, 11);
        assert_eq!(
            *sink.0.borrow(),
            vec!["reference_frame_12_at_position_11.png".to_string()]
        );
    }
}
