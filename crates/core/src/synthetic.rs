//! In-memory videos for exercising alignment without decoders or OCR.
//!
//! A [`SyntheticFrame`] stores its marker and confidence in the first
//! pixels of the image, and [`PixelCodeRecognizer`] reads them back. Scans
//! therefore run through the same [`FrameSource`], [`TextRecognizer`], and
//! [`Transcoder`] seams the real backends implement.
//!
//! Pixel layout of a marked frame:
//! - `(0, 0)`: marker as 24-bit big-endian RGB
//! - `(1, 0)`: first three bytes of the confidence (`f32`, big-endian)
//! - `(2, 0)`: last confidence byte, then `255`, then `0` (presence flag)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{Rgb, RgbImage};
use vidsync_common::clock::FrameClock;
use vidsync_common::error::{VidsyncError, VidsyncResult};
use vidsync_model::sync::{AlignmentOffset, TrimSpec};

use crate::frame::{Frame, FrameSource, VideoInfo, VideoOpener};
use crate::marker::{BoundingBox, RecognitionError, TextRecognizer, TextRegion};
use crate::pipeline::{QualityMetricTool, Transcoder};

pub const FRAME_WIDTH: u32 = 8;
pub const FRAME_HEIGHT: u32 = 8;

/// Largest marker that fits the pixel code.
pub const MAX_MARKER: u64 = 0xFF_FFFF;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Description of one synthetic frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticFrame {
    pub marker: Option<u64>,
    pub confidence: f32,

    /// Luminance of every pixel outside the marker code.
    pub fill: u8,
}

impl SyntheticFrame {
    pub fn marker(marker: u64, confidence: f32) -> Self {
        Self {
            marker: Some(marker.min(MAX_MARKER)),
            confidence,
            fill: 32,
        }
    }

    pub fn blank(fill: u8) -> Self {
        Self {
            marker: None,
            confidence: 0.0,
            fill,
        }
    }

    pub fn render(&self) -> RgbImage {
        let mut image = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([self.fill; 3]));
        if let Some(marker) = self.marker {
            let m = marker.min(MAX_MARKER) as u32;
            let c = self.confidence.to_bits().to_be_bytes();
            image.put_pixel(0, 0, Rgb([(m >> 16) as u8, (m >> 8) as u8, m as u8]));
            image.put_pixel(1, 0, Rgb([c[0], c[1], c[2]]));
            image.put_pixel(2, 0, Rgb([c[3], 255, 0]));
        }
        image
    }

    /// Read `(marker, confidence)` back from a rendered frame.
    ///
    /// Any image whose flag pixel is not exactly `[_, 255, 0]`, including
    /// every grayscale image, carries no marker.
    pub fn decode(image: &RgbImage) -> Option<(u64, f32)> {
        if image.width() < 3 || image.height() < 1 {
            return None;
        }
        let flag = image.get_pixel(2, 0);
        if flag[1] != 255 || flag[2] != 0 {
            return None;
        }
        let m = image.get_pixel(0, 0);
        let c = image.get_pixel(1, 0);
        let marker = (u64::from(m[0]) << 16) | (u64::from(m[1]) << 8) | u64::from(m[2]);
        let confidence = f32::from_bits(u32::from_be_bytes([c[0], c[1], c[2], flag[0]]));
        Some((marker, confidence))
    }
}

/// Recognizer that decodes the pixel code written by [`SyntheticFrame`].
#[derive(Debug, Clone, Default)]
pub struct PixelCodeRecognizer {
    failing: bool,
}

impl PixelCodeRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recognizer whose every call errors.
    pub fn failing() -> Self {
        Self { failing: true }
    }
}

impl TextRecognizer for PixelCodeRecognizer {
    fn name(&self) -> &str {
        "pixel-code"
    }

    fn read(
        &mut self,
        image: &RgbImage,
        allowlist: &str,
    ) -> Result<Vec<TextRegion>, RecognitionError> {
        if self.failing {
            return Err(RecognitionError::Unavailable(
                "pixel-code recognizer disabled".to_string(),
            ));
        }
        let Some((marker, confidence)) = SyntheticFrame::decode(image) else {
            return Ok(vec![]);
        };
        let text: String = marker
            .to_string()
            .chars()
            .filter(|c| allowlist.contains(*c))
            .collect();
        Ok(vec![TextRegion {
            bbox: BoundingBox {
                x: 0,
                y: 0,
                width: 3,
                height: 1,
            },
            text,
            confidence: f64::from(confidence),
        }])
    }
}

/// A video held in memory.
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    info: VideoInfo,
    frames: Arc<Vec<RgbImage>>,
    position: u64,
    read_error_at: Option<u64>,
}

impl SyntheticVideo {
    pub fn new(fps: f64, frames: &[SyntheticFrame]) -> VidsyncResult<Self> {
        Self::from_images(fps, frames.iter().map(SyntheticFrame::render).collect())
    }

    pub fn from_images(fps: f64, images: Vec<RgbImage>) -> VidsyncResult<Self> {
        let clock = FrameClock::new(fps)?;
        let (width, height) = images
            .first()
            .map(|image| image.dimensions())
            .unwrap_or((FRAME_WIDTH, FRAME_HEIGHT));
        Ok(Self {
            info: VideoInfo {
                width,
                height,
                clock,
                frame_count: Some(images.len() as u64),
            },
            frames: Arc::new(images),
            position: 0,
            read_error_at: None,
        })
    }

    /// Make reading frame `index` fail with a decode error.
    pub fn with_read_error_at(mut self, index: u64) -> Self {
        self.read_error_at = Some(index);
        self
    }

    pub fn len(&self) -> u64 {
        self.frames.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the next frame to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Copy of this video starting at `start_index`, rewound.
    pub fn trimmed_from(&self, start_index: u64) -> Self {
        let start = usize::try_from(start_index)
            .unwrap_or(usize::MAX)
            .min(self.frames.len());
        let frames: Vec<RgbImage> = self.frames[start..].to_vec();
        Self {
            info: VideoInfo {
                frame_count: Some(frames.len() as u64),
                ..self.info
            },
            frames: Arc::new(frames),
            position: 0,
            read_error_at: None,
        }
    }
}

impl FrameSource for SyntheticVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn seek(&mut self, index: u64) -> VidsyncResult<()> {
        self.position = index;
        Ok(())
    }

    fn next_frame(&mut self) -> VidsyncResult<Option<Frame>> {
        let index = self.position;
        if self.read_error_at == Some(index) {
            return Err(VidsyncError::decode(format!(
                "synthetic read error at frame {index}"
            )));
        }
        let Some(image) = usize::try_from(index).ok().and_then(|i| self.frames.get(i)) else {
            return Ok(None);
        };
        self.position += 1;
        Ok(Some(Frame {
            index,
            timestamp_secs: self.info.clock.index_to_secs(index),
            image: image.clone(),
        }))
    }
}

/// Path-addressed store of synthetic videos.
///
/// Opens videos like a decoder would and trims them like a stream-copying
/// transcoder would. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct SyntheticLibrary {
    videos: Arc<Mutex<HashMap<PathBuf, SyntheticVideo>>>,
    trims: Arc<Mutex<Vec<TrimSpec>>>,
    trim_failure: Option<String>,
}

impl SyntheticLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, video: SyntheticVideo) {
        lock(&self.videos).insert(path.into(), video);
    }

    pub fn get(&self, path: &Path) -> Option<SyntheticVideo> {
        lock(&self.videos).get(path).cloned()
    }

    /// Make every trim exit with an error carrying `stderr`.
    pub fn with_failing_trim(mut self, stderr: impl Into<String>) -> Self {
        self.trim_failure = Some(stderr.into());
        self
    }

    /// Trims performed so far.
    pub fn trims(&self) -> Vec<TrimSpec> {
        lock(&self.trims).clone()
    }
}

impl VideoOpener for SyntheticLibrary {
    fn open(&self, path: &Path) -> VidsyncResult<Box<dyn FrameSource>> {
        let mut video = self.get(path).ok_or_else(|| VidsyncError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        video.position = 0;
        Ok(Box::new(video))
    }

    fn exists(&self, path: &Path) -> bool {
        lock(&self.videos)
            .get(path)
            .map(|video| !video.is_empty())
            .unwrap_or(false)
    }
}

impl Transcoder for SyntheticLibrary {
    fn trim(&self, input: &Path, output: &Path, trim: &TrimSpec) -> VidsyncResult<()> {
        if let Some(stderr) = &self.trim_failure {
            return Err(VidsyncError::external_tool(
                "ffmpeg",
                1,
                String::new(),
                stderr.clone(),
            ));
        }
        let source = self.get(input).ok_or_else(|| VidsyncError::FileNotFound {
            path: input.to_path_buf(),
        })?;
        let start = source.info.clock.secs_to_index(trim.start_secs);
        self.insert(output, source.trimmed_from(start));
        lock(&self.trims).push(*trim);
        Ok(())
    }
}

/// One call received by [`RecordingMetricTool`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCall {
    pub reference: PathBuf,
    pub distorted: PathBuf,
    pub offset: AlignmentOffset,
}

/// Metric tool that records what it was asked to compare.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetricTool {
    calls: Arc<Mutex<Vec<MetricCall>>>,
    failure: Option<String>,
}

impl RecordingMetricTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every comparison exit with an error carrying `stderr`.
    pub fn failing(stderr: impl Into<String>) -> Self {
        Self {
            calls: Arc::default(),
            failure: Some(stderr.into()),
        }
    }

    pub fn calls(&self) -> Vec<MetricCall> {
        lock(&self.calls).clone()
    }
}

impl QualityMetricTool for RecordingMetricTool {
    fn compare(
        &self,
        reference: &Path,
        distorted: &Path,
        offset: &AlignmentOffset,
    ) -> VidsyncResult<Vec<PathBuf>> {
        lock(&self.calls).push(MetricCall {
            reference: reference.to_path_buf(),
            distorted: distorted.to_path_buf(),
            offset: *offset,
        });
        if let Some(stderr) = &self.failure {
            return Err(VidsyncError::external_tool(
                "docker",
                1,
                String::new(),
                stderr.clone(),
            ));
        }
        let stem = distorted
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(vec![distorted.with_file_name(format!("{stem}_vmaf.json"))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_code_round_trip() {
        let frame = SyntheticFrame::marker(271, 0.93);
        assert_eq!(SyntheticFrame::decode(&frame.render()), Some((271, 0.93)));
        assert_eq!(SyntheticFrame::decode(&SyntheticFrame::blank(255).render()), None);
    }

    #[test]
    fn test_grayscale_loses_the_code() {
        let image = SyntheticFrame::marker(12, 0.9).render();
        let gray = image::DynamicImage::ImageLuma8(image::imageops::grayscale(&image)).to_rgb8();
        assert_eq!(SyntheticFrame::decode(&gray), None);
    }

    #[test]
    fn test_recognizer_reports_region() {
        let mut recognizer = PixelCodeRecognizer::new();
        let regions = recognizer
            .read(&SyntheticFrame::marker(42, 0.75).render(), "0123456789")
            .unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "42");
        assert_eq!(regions[0].confidence, 0.75);

        assert!(PixelCodeRecognizer::failing()
            .read(&SyntheticFrame::blank(0).render(), "0123456789")
            .is_err());
    }

    #[test]
    fn test_video_reads_and_seeks() {
        let frames: Vec<_> = (1..=5).map(|m| SyntheticFrame::marker(m, 0.9)).collect();
        let mut video = SyntheticVideo::new(10.0, &frames).unwrap();
        video.seek(3).unwrap();
        let frame = video.next_frame().unwrap().unwrap();
        assert_eq!(frame.index, 3);
        assert!((frame.timestamp_secs - 0.3).abs() < 1e-9);
        assert_eq!(SyntheticFrame::decode(&frame.image), Some((4, 0.9)));
        video.next_frame().unwrap();
        assert!(video.next_frame().unwrap().is_none());
        assert_eq!(video.position(), 5);
    }

    #[test]
    fn test_read_error_injection() {
        let frames = vec![SyntheticFrame::blank(0); 3];
        let mut video = SyntheticVideo::new(30.0, &frames)
            .unwrap()
            .with_read_error_at(1);
        assert!(video.next_frame().unwrap().is_some());
        assert!(video.next_frame().is_err());
    }

    #[test]
    fn test_library_trim_copies_from_start_time() {
        let frames: Vec<_> = (0..20).map(|m| SyntheticFrame::marker(m, 0.9)).collect();
        let library = SyntheticLibrary::new();
        library.insert("in.mp4", SyntheticVideo::new(10.0, &frames).unwrap());

        let trim = TrimSpec::from_sync(0.0, 1.5);
        library
            .trim(Path::new("in.mp4"), Path::new("out.mp4"), &trim)
            .unwrap();

        let mut out = library.open(Path::new("out.mp4")).unwrap();
        let first = out.next_frame().unwrap().unwrap();
        assert_eq!(SyntheticFrame::decode(&first.image), Some((15, 0.9)));
        assert_eq!(library.trims(), vec![trim]);
        assert!(library.exists(Path::new("out.mp4")));
        assert!(!library.exists(Path::new("missing.mp4")));
    }

    #[test]
    fn test_failing_trim_is_external_tool_error() {
        let library = SyntheticLibrary::new().with_failing_trim("Invalid data");
        let err = library
            .trim(
                Path::new("a.mp4"),
                Path::new("b.mp4"),
                &TrimSpec::from_sync(0.0, 0.0),
            )
            .unwrap_err();
        assert!(err.is_external_tool());
        assert!(err.to_string().contains("Invalid data"));
    }
}
