//! VidSync Media: process-backed implementations of the core seams
//!
//! Everything here shells out to external tools:
//! - [`probe`]: stream properties via `ffprobe`
//! - [`decode`]: raw RGB frames piped from `ffmpeg`
//! - [`trim`]: stream-copy trimming with `ffmpeg`
//! - [`ocr`]: digit recognition with `tesseract`
//! - [`vmaf`]: quality scoring with the easyVmaf container
//! - [`artifacts`]: PNG diagnostics written to a results directory

pub mod artifacts;
pub mod decode;
pub mod ocr;
pub mod probe;
pub mod process;
pub mod trim;
pub mod vmaf;

pub use artifacts::DirectoryArtifactSink;
pub use decode::{FfmpegFrameSource, FfmpegVideoOpener};
pub use ocr::TesseractRecognizer;
pub use probe::probe_video;
pub use process::{check_tools, command_exists, ToolStatus};
pub use trim::FfmpegTrimmer;
pub use vmaf::EasyVmafRunner;
