//! Sync points, trim boundaries, and alignment results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::event::Stage;

/// How a sync point was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Two different confidently-read markers in succession.
    Transition,
    /// Largest frame-to-frame pixel difference in the fallback window.
    FallbackDifference,
}

impl SyncMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMethod::Transition => "transition",
            SyncMethod::FallbackDifference => "fallback-difference",
        }
    }
}

impl std::fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point in the distorted stream where it starts matching the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncPoint {
    /// Presentation time of the sync frame, in seconds.
    pub timestamp_secs: f64,

    /// Index of the sync frame in the scanned stream.
    pub frame_index: u64,

    pub method: SyncMethod,
}

/// Where to cut the distorted stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimSpec {
    /// Seek position handed to the transcoder, always `>= 0`.
    pub start_secs: f64,

    /// Seconds added after the rounded sync timestamp.
    pub buffer_secs: f64,

    /// Sync timestamp the boundary was derived from.
    pub sync_secs: f64,
}

impl TrimSpec {
    /// `start = max(0, round(sync_secs) + buffer_secs)`.
    ///
    /// Rounding is half-to-even, so a sync at 2.5s rounds to 2s.
    pub fn from_sync(sync_secs: f64, buffer_secs: f64) -> Self {
        let start = sync_secs.round_ties_even() + buffer_secs;
        Self {
            start_secs: if start > 0.0 { start } else { 0.0 },
            buffer_secs,
            sync_secs,
        }
    }

    /// Seek argument as passed on the transcoder command line.
    pub fn seek_arg(&self) -> String {
        format!("{:.3}", self.start_secs)
    }
}

/// Reference-relative timestamp at which quality comparison starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentOffset {
    /// Start offset in seconds, `>= 0`.
    pub seconds: f64,

    /// Marker read from the first trimmed frame.
    pub marker: Option<u64>,

    /// Reference frame index where `marker` was found.
    pub reference_frame: Option<u64>,

    /// Measured reference frame rate used for the conversion.
    pub reference_fps: Option<f64>,
}

impl AlignmentOffset {
    /// Offset for a marker located at `frame_index` in a reference at `fps`.
    pub fn located(marker: u64, frame_index: u64, fps: f64) -> Self {
        Self {
            seconds: frame_index as f64 / fps,
            marker: Some(marker),
            reference_frame: Some(frame_index),
            reference_fps: Some(fps),
        }
    }

    /// Documented degraded mode: compare from the start of the reference.
    pub fn degraded(marker: Option<u64>) -> Self {
        Self {
            seconds: 0.0,
            marker,
            reference_frame: None,
            reference_fps: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.reference_frame.is_none()
    }
}

impl Default for AlignmentOffset {
    fn default() -> Self {
        Self::degraded(None)
    }
}

/// A stage that fell back to degraded behavior but let the run continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub stage: Stage,
    pub reason: String,
}

/// A stage that failed hard and aborted the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// Outcome of one alignment run, as reported to the CLI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,

    pub alignment_offset: AlignmentOffset,

    /// `None` only when the run failed before a sync point existed.
    pub sync_method: Option<SyncMethod>,

    pub sync_point: Option<SyncPoint>,

    pub trim: Option<TrimSpec>,

    pub trimmed_path: Option<PathBuf>,

    /// Structured reports emitted by the quality-metric tool.
    #[serde(default)]
    pub report_paths: Vec<PathBuf>,

    /// Soft failures, in the order they happened.
    #[serde(default)]
    pub degradations: Vec<Degradation>,

    pub failure: Option<StageFailure>,
}

impl PipelineResult {
    /// Whether the result can be trusted at full alignment precision.
    pub fn is_fully_aligned(&self) -> bool {
        self.success
            && self.degradations.is_empty()
            && self.sync_method == Some(SyncMethod::Transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_trim_from_sync() {
        let trim = TrimSpec::from_sync(2.0, 5.0);
        assert_eq!(trim.start_secs, 7.0);
        assert_eq!(trim.seek_arg(), "7.000");
    }

    #[test]
    fn test_trim_rounds_half_to_even() {
        assert_eq!(TrimSpec::from_sync(2.5, 0.0).start_secs, 2.0);
        assert_eq!(TrimSpec::from_sync(3.5, 0.0).start_secs, 4.0);
        assert_eq!(TrimSpec::from_sync(2.4667, 5.0).start_secs, 7.0);
    }

    #[test]
    fn test_trim_clamps_negative_to_zero() {
        let trim = TrimSpec::from_sync(-4.2, 1.0);
        assert_eq!(trim.start_secs, 0.0);
        assert!(trim.start_secs.is_sign_positive());
    }

    #[test]
    fn test_located_offset_uses_measured_rate() {
        let offset = AlignmentOffset::located(271, 270, 30.0);
        assert!((offset.seconds - 9.0).abs() < 1e-9);
        assert!(!offset.is_degraded());

        let pal = AlignmentOffset::located(271, 270, 25.0);
        assert!((pal.seconds - 10.8).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_offset_is_zero() {
        let offset = AlignmentOffset::degraded(Some(12));
        assert_eq!(offset.seconds, 0.0);
        assert!(offset.is_degraded());
        assert_eq!(offset.marker, Some(12));
    }

    #[test]
    fn test_sync_method_serializes_snake_case() {
        let json = serde_json::to_string(&SyncMethod::FallbackDifference).unwrap();
        assert_eq!(json, "\"fallback_difference\"");
        assert_eq!(SyncMethod::FallbackDifference.to_string(), "fallback-difference");
    }

    proptest! {
        #[test]
        fn prop_trim_start_never_negative(offset in -5.0f64..1000.0, buffer in 0.0f64..10.0) {
            let trim = TrimSpec::from_sync(offset, buffer);
            let raw = offset.round_ties_even() + buffer;
            prop_assert!(trim.start_secs >= 0.0);
            if raw >= 0.0 {
                prop_assert!(trim.start_secs <= raw);
                prop_assert_eq!(trim.start_secs, raw);
            } else {
                prop_assert_eq!(trim.start_secs, 0.0);
            }
        }
    }
}
