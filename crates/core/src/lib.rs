//! VidSync Core: temporal alignment of a distorted encode to its reference
//!
//! Finds where a distorted stream starts matching the reference using the
//! frame-number markers burned into both:
//! - **Marker reading:** Best-confidence digit recognition per frame
//! - **Transition search:** First confident change of marker value
//! - **Difference fallback:** Largest frame-to-frame pixel change
//! - **Frame location:** First reference frame showing a given marker
//! - **Pipeline:** Sync, trim, re-read, locate, and hand off to the metric tool
//!
//! This crate spawns no processes and touches no files. Decoding, OCR,
//! trimming, and quality scoring are reached through the traits in
//! [`frame`], [`marker`], and [`pipeline`].

pub mod artifacts;
pub mod difference;
pub mod frame;
pub mod locator;
pub mod marker;
pub mod pipeline;
pub mod scan;
#[cfg(any(test, feature = "test-support"))]
pub mod synthetic;
pub mod transition;

pub use artifacts::{ArtifactSink, NullArtifactSink};
pub use difference::DifferenceSyncFinder;
pub use frame::{Frame, FrameSource, VideoInfo, VideoOpener};
pub use locator::FrameLocator;
pub use marker::{MarkerReader, RecognitionError, TextRecognizer, TextRegion};
pub use pipeline::{
    AlignmentPipeline, PipelineContext, PipelineRun, QualityMetricTool, SyncSettings, Transcoder,
};
pub use scan::ScanContext;
pub use transition::{TransitionConfig, TransitionSyncFinder};
