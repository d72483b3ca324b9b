//! Frame-number marker reading.
//!
//! Pixel-to-text recognition is an external capability behind
//! [`TextRecognizer`]. [`MarkerReader`] restricts it to digits, keeps the
//! most confident region, and turns every failure into "no marker".

use image::RgbImage;
use vidsync_model::detection::{Detection, DIGIT_ALPHABET};

/// Axis-aligned region reported by a recognizer, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One piece of recognized text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub bbox: BoundingBox,
    pub text: String,

    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl TextRegion {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            bbox: BoundingBox::default(),
            text: text.into(),
            confidence,
        }
    }
}

/// Failure inside the recognition capability.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),

    #[error("recognizer failed: {0}")]
    Failed(String),

    #[error("unreadable recognizer output: {0}")]
    Output(String),
}

/// Text recognition capability.
pub trait TextRecognizer {
    /// Backend identifier.
    fn name(&self) -> &str;

    /// Recognize text in `image`, restricted to characters in `allowlist`.
    fn read(
        &mut self,
        image: &RgbImage,
        allowlist: &str,
    ) -> Result<Vec<TextRegion>, RecognitionError>;
}

/// Reads the frame-number marker of a frame.
pub struct MarkerReader {
    recognizer: Box<dyn TextRecognizer>,
}

impl MarkerReader {
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    /// Read the marker, surfacing recognizer failures.
    ///
    /// The highest-confidence region wins; on a tie the first one reported
    /// is kept. Non-numeric text or no text yields [`Detection::NONE`].
    pub fn try_detect(&mut self, image: &RgbImage) -> Result<Detection, RecognitionError> {
        let regions = self.recognizer.read(image, DIGIT_ALPHABET)?;
        let Some(best) = best_region(&regions) else {
            return Ok(Detection::none());
        };

        tracing::trace!(text = %best.text, confidence = best.confidence, "Recognized text");
        Ok(parse_marker(&best.text)
            .map(|marker| Detection::new(marker, best.confidence))
            .unwrap_or_default())
    }

    /// Read the marker; recognizer failures count as "no marker".
    pub fn detect(&mut self, image: &RgbImage) -> Detection {
        match self.try_detect(image) {
            Ok(detection) => detection,
            Err(err) => {
                tracing::warn!(
                    recognizer = self.recognizer.name(),
                    error = %err,
                    "Marker recognition failed"
                );
                Detection::none()
            }
        }
    }
}

fn best_region(regions: &[TextRegion]) -> Option<&TextRegion> {
    let mut best: Option<&TextRegion> = None;
    for region in regions {
        match best {
            Some(current) if region.confidence <= current.confidence => {}
            _ => best = Some(region),
        }
    }
    best
}

/// Digits only; any other character, whitespace included, is no marker.
fn parse_marker(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
