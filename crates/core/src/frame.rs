//! Decoded frames and the video sources that produce them.

use std::path::Path;

use image::{GrayImage, RgbImage};
use vidsync_common::clock::FrameClock;
use vidsync_common::error::VidsyncResult;

/// Stream properties needed to walk a video by frame index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,

    /// Timebase derived from the measured frame rate.
    pub clock: FrameClock,

    /// Total frames, when the container reports it.
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    pub fn fps(&self) -> f64 {
        self.clock.fps()
    }

    /// Duration in seconds, when the frame count is known.
    pub fn duration_secs(&self) -> Option<f64> {
        self.frame_count.map(|n| self.clock.index_to_secs(n))
    }
}

/// A decoded RGB frame and its position in the stream.
///
/// Owned by the scan loop that read it and dropped at the end of the
/// iteration unless explicitly persisted.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp_secs: f64,
    pub image: RgbImage,
}

impl Frame {
    /// Single-channel intensity view of the frame.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}

/// Sequential frame reader with random seek.
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// Position the source so the next frame read is `index`.
    fn seek(&mut self, index: u64) -> VidsyncResult<()>;

    /// Read the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> VidsyncResult<Option<Frame>>;
}

/// Opens frame sources by path.
///
/// Each pipeline stage opens its own handle and drops it before the next
/// stage starts.
pub trait VideoOpener {
    fn open(&self, path: &Path) -> VidsyncResult<Box<dyn FrameSource>>;

    /// Whether `path` names existing, non-empty media.
    fn exists(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }
}

/// Sum of absolute per-pixel differences between two intensity images.
///
/// Images of different sizes are compared over their overlapping buffer.
pub fn abs_diff_sum(a: &GrayImage, b: &GrayImage) -> u64 {
    a.as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum()
}

/// Brightness statistics used when a frame yields no marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessStats {
    pub mean: f64,
    pub max: u8,

    /// Pixels brighter than 200.
    pub white_pixels: u64,
    pub total_pixels: u64,
}

impl BrightnessStats {
    pub fn of(gray: &GrayImage) -> Self {
        let raw = gray.as_raw();
        let total_pixels = raw.len() as u64;
        let sum: u64 = raw.iter().map(|&v| u64::from(v)).sum();
        Self {
            mean: if total_pixels == 0 {
                0.0
            } else {
                sum as f64 / total_pixels as f64
            },
            max: raw.iter().copied().max().unwrap_or(0),
            white_pixels: raw.iter().filter(|&&v| v > 200).count() as u64,
            total_pixels,
        }
    }

    pub fn white_percent(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            100.0 * self.white_pixels as f64 / self.total_pixels as f64
        }
    }
}
