//! PNG diagnostics written into a results directory.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use vidsync_common::error::VidsyncResult;
use vidsync_core::artifacts::ArtifactSink;

/// Writes each artifact as `<dir>/<name>`.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSink {
    dir: PathBuf,
}

impl DirectoryArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirectoryArtifactSink {
    fn save_image(&self, name: &str, image: &DynamicImage) -> VidsyncResult<Option<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        Ok(Some(path))
    }
}
