//! Clock and timebase utilities for stream synchronization.
//!
//! Video positions are tracked as zero-based frame indices. This module
//! provides utilities for:
//! - Converting between frame indices and seconds at a known frame rate
//! - Sizing bounded scan windows in frames
//! - Timing a whole run and stamping its results directory

use std::time::Instant;

use crate::error::{VidsyncError, VidsyncResult};

/// Frame-rate based timebase for a single video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: f64,
}

impl FrameClock {
    /// Create a timebase, rejecting non-positive or non-finite rates.
    pub fn new(fps: f64) -> VidsyncResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(VidsyncError::decode(format!("invalid frame rate: {fps}")));
        }
        Ok(Self { fps })
    }

    /// Frames per second.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Presentation time of a frame index, in seconds.
    pub fn index_to_secs(&self, index: u64) -> f64 {
        index as f64 / self.fps
    }

    /// Frame index shown at `secs`, truncating toward zero.
    ///
    /// Negative times map to frame 0.
    pub fn secs_to_index(&self, secs: f64) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        (secs * self.fps) as u64
    }

    /// Number of frames covered by a window of `secs` seconds.
    pub fn window_frames(&self, secs: f64) -> u64 {
        self.secs_to_index(secs)
    }
}

/// Wall and monotonic clock for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunClock {
    /// The instant the run started.
    started: Instant,

    /// Local wall-clock stamp at start, `YYYYmmdd_HHMMSS`.
    stamp: String,
}

impl RunClock {
    /// Start a run clock anchored to now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            stamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    /// Seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Compact wall-clock stamp, suitable for directory names.
    pub fn stamp(&self) -> &str {
        &self.stamp
    }
}
