//! Diagnostic image output.
//!
//! Frames written here are for human inspection only. A failed write is
//! logged and never changes the outcome of a stage.

use std::path::PathBuf;

use image::DynamicImage;
use vidsync_common::error::VidsyncResult;

/// Destination for debug and validation frames.
pub trait ArtifactSink {
    /// Persist `image` under `name` (e.g. `trimmed_first_frame.png`).
    ///
    /// Returns the written path, or `None` if the sink discards images.
    fn save_image(&self, name: &str, image: &DynamicImage) -> VidsyncResult<Option<PathBuf>>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullArtifactSink;

impl ArtifactSink for NullArtifactSink {
    fn save_image(&self, _name: &str, _image: &DynamicImage) -> VidsyncResult<Option<PathBuf>> {
        Ok(None)
    }
}

/// Save an artifact, logging the outcome instead of returning it.
pub fn persist(sink: &dyn ArtifactSink, name: &str, image: DynamicImage) {
    match sink.save_image(name, &image) {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "Saved diagnostic frame"),
        Ok(None) => {}
        Err(err) => tracing::warn!(name, error = %err, "Failed to save diagnostic frame"),
    }
}
