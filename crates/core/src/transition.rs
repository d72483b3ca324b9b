//! Marker-transition sync search.
//!
//! The distorted stream is considered synchronized at the first frame
//! where a confidently read marker differs from the previous confidently
//! read marker. Any change of value counts; no ordering between markers is
//! assumed.

use image::DynamicImage;
use vidsync_common::error::VidsyncResult;
use vidsync_model::detection::Detection;
use vidsync_model::event::{EventKind, Stage, SyncEvent};
use vidsync_model::sync::{SyncMethod, SyncPoint};

use crate::artifacts::persist;
use crate::frame::FrameSource;
use crate::scan::ScanContext;

/// Unreadable frames saved as `debug_frame_<index>.png` per search.
pub const MAX_DEBUG_FRAMES: usize = 10;

/// Configuration for the transition search.
#[derive(Debug, Clone)]
pub struct TransitionConfig {
    /// A detection qualifies only when its confidence is strictly above this.
    pub confidence_threshold: f64,

    /// Scan length from the seek position, in seconds.
    pub window_secs: f64,

    /// Consecutive qualifying reads, all differing from the previous value
    /// and never decreasing, needed to accept a change. `1` accepts the
    /// first differing read.
    pub confirm_frames: usize,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            window_secs: 30.0,
            confirm_frames: 1,
        }
    }
}

/// Change seen but not yet confirmed.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// First value after the change.
    marker: u64,

    /// Most recent value of the run; later reads may not go below it.
    latest: u64,

    frame_index: u64,
    timestamp_secs: f64,
    reads: usize,
}

/// Finds the first confident change of marker value.
pub struct TransitionSyncFinder {
    config: TransitionConfig,
}

impl TransitionSyncFinder {
    pub fn new(config: TransitionConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(TransitionConfig::default())
    }

    /// Scan `source` from `seek_secs` for a marker transition.
    ///
    /// Returns `Ok(None)` once the window or the stream is exhausted. Read
    /// errors are returned as-is.
    pub fn find(
        &self,
        source: &mut dyn FrameSource,
        scan: &mut ScanContext<'_>,
        seek_secs: f64,
    ) -> VidsyncResult<Option<SyncPoint>> {
        let clock = source.info().clock;
        let start = clock.secs_to_index(seek_secs);
        let window = clock.window_frames(self.config.window_secs);
        let confirm = self.config.confirm_frames.max(1);
        source.seek(start)?;

        tracing::info!(
            start_frame = start,
            window_frames = window,
            threshold = self.config.confidence_threshold,
            "Searching for marker transition"
        );

        let mut last: Option<u64> = None;
        let mut candidate: Option<Candidate> = None;
        let mut scanned = 0u64;
        let mut debug_saved = 0usize;

        while scanned < window {
            let Some(frame) = source.next_frame()? else {
                tracing::debug!(frames_scanned = scanned, "Stream ended during sync search");
                break;
            };
            scanned += 1;

            let detection = scan.reader.detect(&frame.image);
            tracing::info!(
                frame = frame.index,
                secs = frame.timestamp_secs,
                detection = %detection,
                "Scanned frame"
            );
            scan.events.push(SyncEvent::frame(
                Stage::SyncSearch,
                frame.index,
                frame.timestamp_secs,
                Some(detection),
                EventKind::FrameScanned,
            ));

            if detection.is_none() {
                if debug_saved < MAX_DEBUG_FRAMES {
                    persist(
                        scan.artifacts,
                        &format!("debug_frame_{}.png", frame.index),
                        DynamicImage::ImageRgb8(frame.image),
                    );
                    debug_saved += 1;
                    if debug_saved == MAX_DEBUG_FRAMES {
                        tracing::debug!(
                            limit = MAX_DEBUG_FRAMES,
                            "Debug frame limit reached, later unreadable frames are not saved"
                        );
                    }
                }
                continue;
            }
            let Some(marker) = qualifying_marker(&detection, self.config.confidence_threshold)
            else {
                continue;
            };

            let Some(previous) = last else {
                last = Some(marker);
                continue;
            };
            if marker == previous {
                candidate = None;
                continue;
            }

            let current = match candidate {
                Some(c) if marker >= c.latest => Candidate {
                    latest: marker,
                    reads: c.reads + 1,
                    ..c
                },
                _ => Candidate {
                    marker,
                    latest: marker,
                    frame_index: frame.index,
                    timestamp_secs: frame.timestamp_secs,
                    reads: 1,
                },
            };

            if current.reads >= confirm {
                tracing::info!(
                    from = previous,
                    to = current.marker,
                    frame = current.frame_index,
                    secs = current.timestamp_secs,
                    "Found marker transition"
                );
                scan.events.push(SyncEvent::frame(
                    Stage::SyncSearch,
                    current.frame_index,
                    current.timestamp_secs,
                    None,
                    EventKind::TransitionFound {
                        from: previous,
                        to: current.marker,
                    },
                ));
                return Ok(Some(SyncPoint {
                    timestamp_secs: current.timestamp_secs,
                    frame_index: current.frame_index,
                    method: SyncMethod::Transition,
                }));
            }
            candidate = Some(current);
        }

        tracing::warn!(frames_scanned = scanned, "No marker transition found");
        scan.events.push(SyncEvent::stage(
            Stage::SyncSearch,
            EventKind::WindowExhausted {
                frames_scanned: scanned,
            },
        ));
        Ok(None)
    }
}

fn qualifying_marker(detection: &Detection, threshold: f64) -> Option<u64> {
    if detection.qualifies(threshold) {
        detection.marker
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    use crate::artifacts::{ArtifactSink, NullArtifactSink};
    use crate::marker::MarkerReader;
    use crate::synthetic::{PixelCodeRecognizer, SyntheticFrame, SyntheticVideo};
    use vidsync_model::event::EventLog;

    fn marked(markers: &[(u64, f32)]) -> Vec<SyntheticFrame> {
        markers
            .iter()
            .map(|&(m, c)| SyntheticFrame::marker(m, c))
            .collect()
    }

    fn run(
        finder: &TransitionSyncFinder,
        frames: &[SyntheticFrame],
        fps: f64,
        seek_secs: f64,
    ) -> (Option<SyncPoint>, EventLog) {
        let mut video = SyntheticVideo::new(fps, frames).unwrap();
        let mut reader = MarkerReader::new(Box::new(PixelCodeRecognizer::new()));
        let mut events = EventLog::new();
        let sink = NullArtifactSink;
        let mut scan = ScanContext::new(&mut reader, &mut events, &sink);
        let found = finder.find(&mut video, &mut scan, seek_secs).unwrap();
        (found, events)
    }

    #[test]
    fn test_first_change_wins() {
        let frames = marked(&[(5, 0.9), (5, 0.9), (5, 0.9), (7, 0.9), (7, 0.9), (9, 0.9)]);
        let (found, events) = run(&TransitionSyncFinder::with_defaults(), &frames, 30.0, 0.0);
        let sync = found.unwrap();
        assert_eq!(sync.frame_index, 3);
        assert_eq!(sync.method, SyncMethod::Transition);
        assert!((sync.timestamp_secs - 0.1).abs() < 1e-9);
        assert_eq!(events.frames_scanned(Stage::SyncSearch), 4);
        assert!(events
            .events()
            .iter()
            .any(|e| e.kind == EventKind::TransitionFound { from: 5, to: 7 }));
    }

    #[test]
    fn test_any_value_change_counts() {
        let frames = marked(&[(40, 0.9), (12, 0.9)]);
        let (found, _) = run(&TransitionSyncFinder::with_defaults(), &frames, 30.0, 0.0);
        assert_eq!(found.unwrap().frame_index, 1);
    }

    #[test]
    fn test_confidence_at_threshold_does_not_qualify() {
        let frames = marked(&[(1, 0.9), (2, 0.5), (2, 0.5)]);
        let (found, events) = run(&TransitionSyncFinder::with_defaults(), &frames, 30.0, 0.0);
        assert!(found.is_none());
        assert_eq!(events.frames_scanned(Stage::SyncSearch), 3);
    }

    #[test]
    fn test_confidence_just_above_threshold_qualifies() {
        let frames = marked(&[(1, 0.9), (2, 0.500_000_1)]);
        let (found, _) = run(&TransitionSyncFinder::with_defaults(), &frames, 30.0, 0.0);
        assert_eq!(found.unwrap().frame_index, 1);
    }

    #[test]
    fn test_low_confidence_and_blank_frames_do_not_break_streak() {
        let mut frames = marked(&[(3, 0.9), (8, 0.2)]);
        frames.push(SyntheticFrame::blank(0));
        frames.extend(marked(&[(3, 0.95), (4, 0.8)]));
        let (found, _) = run(&TransitionSyncFinder::with_defaults(), &frames, 30.0, 0.0);
        assert_eq!(found.unwrap().frame_index, 4);
    }

    #[test]
    fn test_seek_offset_is_honored() {
        // The 1 -> 2 change sits before the seek point.
        let frames = marked(&[(1, 0.9), (2, 0.9), (2, 0.9), (2, 0.9), (3, 0.9)]);
        let (found, events) = run(&TransitionSyncFinder::with_defaults(), &frames, 10.0, 0.2);
        assert_eq!(found.unwrap().frame_index, 4);
        assert_eq!(events.detections(Stage::SyncSearch)[0].0, 2);
    }

    #[test]
    fn test_window_is_bounded() {
        let frames = vec![SyntheticFrame::blank(0); 100];
        let finder = TransitionSyncFinder::new(TransitionConfig {
            window_secs: 2.0,
            ..TransitionConfig::default()
        });
        let (found, events) = run(&finder, &frames, 10.0, 0.0);
        assert!(found.is_none());
        assert_eq!(events.frames_scanned(Stage::SyncSearch), 20);
        assert!(events
            .events()
            .iter()
            .any(|e| e.kind == EventKind::WindowExhausted { frames_scanned: 20 }));
    }

    #[derive(Default)]
    struct NameSink(RefCell<Vec<String>>);

    impl ArtifactSink for NameSink {
        fn save_image(
            &self,
            name: &str,
            _image: &DynamicImage,
        ) -> VidsyncResult<Option<PathBuf>> {
            self.0.borrow_mut().push(name.to_string());
            Ok(None)
        }
    }

    #[test]
    fn test_only_first_unreadable_frames_are_saved() {
        let frames = vec![SyntheticFrame::blank(0); 40];
        let mut video = SyntheticVideo::new(10.0, &frames).unwrap();
        let mut reader = MarkerReader::new(Box::new(PixelCodeRecognizer::new()));
        let mut events = EventLog::new();
        let sink = NameSink::default();
        let mut scan = ScanContext::new(&mut reader, &mut events, &sink);
        let found = TransitionSyncFinder::with_defaults()
            .find(&mut video, &mut scan, 0.0)
            .unwrap();

        assert!(found.is_none());
        assert_eq!(events.frames_scanned(Stage::SyncSearch), 40);
        let expected: Vec<String> = (0..MAX_DEBUG_FRAMES)
            .map(|i| format!("debug_frame_{i}.png"))
            .collect();
        assert_eq!(*sink.0.borrow(), expected);
    }

    #[test]
    fn test_stream_shorter_than_window() {
        let frames = marked(&[(1, 0.9), (1, 0.9)]);
        let (found, events) = run(&TransitionSyncFinder::with_defaults(), &frames, 30.0, 0.0);
        assert!(found.is_none());
        assert_eq!(events.frames_scanned(Stage::SyncSearch), 2);
    }

    #[test]
    fn test_debounce_rejects_single_misread() {
        let finder = TransitionSyncFinder::new(TransitionConfig {
            confirm_frames: 2,
            ..TransitionConfig::default()
        });
        let frames = marked(&[(5, 0.9), (6, 0.9), (5, 0.9), (7, 0.9), (7, 0.9)]);
        let (found, _) = run(&finder, &frames, 30.0, 0.0);
        let sync = found.unwrap();
        assert_eq!(sync.frame_index, 3, "sync is the first frame of the new value");
    }

    #[test]
    fn test_debounce_accepts_counting_markers() {
        let finder = TransitionSyncFinder::new(TransitionConfig {
            confirm_frames: 3,
            ..TransitionConfig::default()
        });
        let frames = marked(&[(40, 0.9), (40, 0.9), (61, 0.9), (62, 0.9), (63, 0.9), (64, 0.9)]);
        let (found, events) = run(&finder, &frames, 30.0, 0.0);
        assert_eq!(found.unwrap().frame_index, 2);
        assert!(events
            .events()
            .iter()
            .any(|e| e.kind == EventKind::TransitionFound { from: 40, to: 61 }));
    }

    #[test]
    fn test_debounce_restarts_when_markers_go_backwards() {
        let finder = TransitionSyncFinder::new(TransitionConfig {
            confirm_frames: 2,
            ..TransitionConfig::default()
        });
        let frames = marked(&[(5, 0.9), (9, 0.9), (7, 0.9), (8, 0.9)]);
        let (found, _) = run(&finder, &frames, 30.0, 0.0);
        assert_eq!(found.unwrap().frame_index, 2);
    }

    #[test]
    fn test_recognizer_failure_is_no_detection() {
        let frames = marked(&[(1, 0.9), (2, 0.9)]);
        let mut video = SyntheticVideo::new(30.0, &frames).unwrap();
        let mut reader = MarkerReader::new(Box::new(PixelCodeRecognizer::failing()));
        let mut events = EventLog::new();
        let sink = NullArtifactSink;
        let mut scan = ScanContext::new(&mut reader, &mut events, &sink);
        let found = TransitionSyncFinder::with_defaults()
            .find(&mut video, &mut scan, 0.0)
            .unwrap();
        assert!(found.is_none());
        assert!(events
            .detections(Stage::SyncSearch)
            .iter()
            .all(|(_, d)| d.is_none()));
    }
}
