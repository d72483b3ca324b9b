//! Frame-difference sync fallback.
//!
//! Used when no marker transition is found. The sync point is the frame
//! with the largest intensity change from its predecessor, which is where
//! a cut from lead-in to content usually happens.

use vidsync_model::event::{EventKind, EventLog, Stage, SyncEvent};
use vidsync_model::sync::{SyncMethod, SyncPoint};

use crate::frame::{abs_diff_sum, FrameSource};

/// Largest-change search over a bounded window.
pub struct DifferenceSyncFinder {
    window_secs: f64,
}

impl Default for DifferenceSyncFinder {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl DifferenceSyncFinder {
    pub fn new(window_secs: f64) -> Self {
        Self { window_secs }
    }

    /// Find the frame with the largest change within the window.
    ///
    /// Never fails. If every difference is zero, or nothing can be read,
    /// the seek position itself is returned. A read error ends the scan
    /// with the best frame found so far.
    pub fn find(
        &self,
        source: &mut dyn FrameSource,
        seek_secs: f64,
        events: &mut EventLog,
    ) -> SyncPoint {
        let clock = source.info().clock;
        let start = clock.secs_to_index(seek_secs);
        let window = clock.window_frames(self.window_secs);
        let end = start.saturating_add(window);
        let progress_every = (clock.fps().round() as u64).max(1);

        if let Err(err) = source.seek(start) {
            tracing::warn!(error = %err, start_frame = start, "Seek failed before difference analysis");
        }
        tracing::info!(
            start_frame = start,
            end_frame = end,
            "Analyzing frames for maximum difference"
        );

        let mut best_index = start;
        let mut best_score = 0u64;
        let mut previous = None;
        let mut scanned = 0u64;

        while scanned < window {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "Frame read failed during difference analysis");
                    break;
                }
            };
            scanned += 1;

            let gray = frame.to_gray();
            events.push(SyncEvent::frame(
                Stage::FallbackDifference,
                frame.index,
                frame.timestamp_secs,
                None,
                EventKind::FrameScanned,
            ));

            if let Some(prev) = &previous {
                let score = abs_diff_sum(&gray, prev);
                if score > best_score {
                    best_score = score;
                    best_index = frame.index;
                    tracing::debug!(frame = frame.index, score, "New max difference");
                    events.push(SyncEvent::frame(
                        Stage::FallbackDifference,
                        frame.index,
                        frame.timestamp_secs,
                        None,
                        EventKind::DifferenceMax { score },
                    ));
                }
            }
            previous = Some(gray);

            if scanned % progress_every == 0 {
                tracing::info!("Analyzed {scanned}/{window} frames");
            }
        }

        let timestamp_secs = clock.index_to_secs(best_index);
        tracing::info!(
            frame = best_index,
            secs = timestamp_secs,
            score = best_score,
            "Fallback sync point found"
        );
        SyncPoint {
            timestamp_secs,
            frame_index: best_index,
            method: SyncMethod::FallbackDifference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticFrame, SyntheticVideo};
    use proptest::prelude::*;

    fn video(fills: &[u8]) -> SyntheticVideo {
        let frames: Vec<_> = fills.iter().map(|&f| SyntheticFrame::blank(f)).collect();
        SyntheticVideo::new(10.0, &frames).unwrap()
    }

    #[test]
    fn test_black_video_returns_start_within_window() {
        let mut source = video(&[0; 200]);
        let mut events = EventLog::new();
        let sync = DifferenceSyncFinder::new(10.0).find(&mut source, 0.0, &mut events);
        assert_eq!(sync.frame_index, 0);
        assert_eq!(sync.timestamp_secs, 0.0);
        assert_eq!(sync.method, SyncMethod::FallbackDifference);
        assert_eq!(events.frames_scanned(Stage::FallbackDifference), 100);
        assert_eq!(source.position(), 100);
    }

    #[test]
    fn test_largest_change_is_picked() {
        let mut source = video(&[0, 0, 10, 10, 250, 250, 200]);
        let mut events = EventLog::new();
        let sync = DifferenceSyncFinder::default().find(&mut source, 0.0, &mut events);
        assert_eq!(sync.frame_index, 4);
        assert!((sync.timestamp_secs - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_equal_change_keeps_earliest() {
        let mut source = video(&[0, 100, 0, 100]);
        let mut events = EventLog::new();
        let sync = DifferenceSyncFinder::default().find(&mut source, 0.0, &mut events);
        assert_eq!(sync.frame_index, 1);
    }

    #[test]
    fn test_seek_sets_start_frame() {
        let mut source = video(&[0, 255, 0, 0, 0, 0]);
        let mut events = EventLog::new();
        let sync = DifferenceSyncFinder::default().find(&mut source, 0.3, &mut events);
        assert_eq!(sync.frame_index, 3);
    }

    #[test]
    fn test_read_error_returns_best_so_far() {
        let mut source = video(&[0, 90, 90, 255]).with_read_error_at(3);
        let mut events = EventLog::new();
        let sync = DifferenceSyncFinder::default().find(&mut source, 0.0, &mut events);
        assert_eq!(sync.frame_index, 1);
    }

    #[test]
    fn test_empty_stream() {
        let mut source = video(&[]);
        let mut events = EventLog::new();
        let sync = DifferenceSyncFinder::default().find(&mut source, 1.0, &mut events);
        assert_eq!(sync.frame_index, 10);
        assert!((sync.timestamp_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_seek_past_representable_frames() {
        let mut source = video(&[0, 255, 0]);
        let mut events = EventLog::new();
        let sync = DifferenceSyncFinder::default().find(&mut source, 1e30, &mut events);
        assert_eq!(sync.frame_index, u64::MAX);
        assert_eq!(events.frames_scanned(Stage::FallbackDifference), 0);
    }

    proptest! {
        #[test]
        fn prop_fallback_stays_inside_window(fills in proptest::collection::vec(any::<u8>(), 0..300)) {
            let mut source = video(&fills);
            let mut events = EventLog::new();
            let sync = DifferenceSyncFinder::new(10.0).find(&mut source, 0.0, &mut events);
            prop_assert!(sync.frame_index < 100);
            prop_assert!(events.frames_scanned(Stage::FallbackDifference) <= 100);
            if !fills.is_empty() {
                prop_assert!(sync.frame_index < fills.len() as u64);
            }
        }
    }
}
