//! Marker detections.

use serde::{Deserialize, Serialize};

/// Alphabet the recognizer is restricted to when reading markers.
pub const DIGIT_ALPHABET: &str = "0123456789";

/// Result of reading the on-screen marker of a single frame.
///
/// `marker == None` means no numeric marker was read at all, which is
/// distinct from a marker read with zero confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Integer shown on the frame, if one was read.
    pub marker: Option<u64>,

    /// Recognizer confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl Detection {
    /// No marker read.
    pub const NONE: Detection = Detection {
        marker: None,
        confidence: 0.0,
    };

    /// A marker read with the given confidence (clamped to `[0, 1]`).
    pub fn new(marker: u64, confidence: f64) -> Self {
        Self {
            marker: Some(marker),
            confidence: clamp_unit(confidence),
        }
    }

    pub fn none() -> Self {
        Self::NONE
    }

    pub fn is_none(&self) -> bool {
        self.marker.is_none()
    }

    /// Whether this reading takes part in transition detection.
    ///
    /// The threshold is exclusive: a confidence equal to it does not qualify.
    pub fn qualifies(&self, threshold: f64) -> bool {
        self.marker.is_some() && self.confidence > threshold
    }
}

impl Default for Detection {
    fn default() -> Self {
        Self::NONE
    }
}

impl std::fmt::Display for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.marker {
            Some(marker) => write!(f, "{marker} (conf: {:.3})", self.confidence),
            None => write!(f, "no number detected"),
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
