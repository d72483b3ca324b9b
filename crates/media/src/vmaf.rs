//! VMAF scoring with the easyVmaf container.

use std::path::{Path, PathBuf};
use std::process::Command;

use vidsync_common::config::ToolPaths;
use vidsync_common::error::{VidsyncError, VidsyncResult};
use vidsync_core::pipeline::QualityMetricTool;
use vidsync_model::sync::AlignmentOffset;

use crate::process::run_streamed;

/// Container mount point of the distorted video's directory.
const DISTORTED_MOUNT: &str = "/videos";

/// Container mount point of the reference video's directory.
const REFERENCE_MOUNT: &str = "/reference";

/// Log a progress line every this many output lines.
const PROGRESS_EVERY: usize = 100;

/// [`QualityMetricTool`] running `gfdavila/easyvmaf` (or a compatible image)
/// through docker.
#[derive(Debug, Clone)]
pub struct EasyVmafRunner {
    docker: String,
    image: String,
}

impl EasyVmafRunner {
    pub fn new(docker: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            image: image.into(),
        }
    }

    pub fn from_tools(tools: &ToolPaths) -> Self {
        Self::new(tools.docker.clone(), tools.vmaf_image.clone())
    }

    /// Docker arguments for comparing `distorted` to `reference`.
    ///
    /// Both paths must be absolute; their parent directories are mounted
    /// into the container.
    pub fn args(
        &self,
        reference: &Path,
        distorted: &Path,
        offset: &AlignmentOffset,
    ) -> VidsyncResult<Vec<String>> {
        let (reference_dir, reference_name) = split_path(reference)?;
        let (distorted_dir, distorted_name) = split_path(distorted)?;
        Ok(vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{DISTORTED_MOUNT}", distorted_dir.display()),
            "-v".to_string(),
            format!("{}:{REFERENCE_MOUNT}", reference_dir.display()),
            self.image.clone(),
            "-r".to_string(),
            format!("{REFERENCE_MOUNT}/{reference_name}"),
            "-d".to_string(),
            format!("{DISTORTED_MOUNT}/{distorted_name}"),
            "-ss".to_string(),
            format!("{:.6}", offset.seconds),
            "-endsync".to_string(),
            "-output_fmt".to_string(),
            "json".to_string(),
        ])
    }
}

fn split_path(path: &Path) -> VidsyncResult<(&Path, String)> {
    let dir = path
        .parent()
        .ok_or_else(|| VidsyncError::pipeline(format!("no parent directory: {}", path.display())))?;
    let name = path
        .file_name()
        .ok_or_else(|| VidsyncError::pipeline(format!("no file name: {}", path.display())))?
        .to_string_lossy()
        .into_owned();
    Ok((dir, name))
}

/// `*vmaf*.json` files in `dir`, sorted by name.
pub fn find_reports(dir: &Path) -> VidsyncResult<Vec<PathBuf>> {
    let mut reports: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().contains("vmaf"))
        })
        .collect();
    reports.sort();
    Ok(reports)
}

impl QualityMetricTool for EasyVmafRunner {
    fn compare(
        &self,
        reference: &Path,
        distorted: &Path,
        offset: &AlignmentOffset,
    ) -> VidsyncResult<Vec<PathBuf>> {
        let reference = std::fs::canonicalize(reference)?;
        let distorted = std::fs::canonicalize(distorted)?;
        let args = self.args(&reference, &distorted, offset)?;

        tracing::info!(offset_secs = offset.seconds, "Starting VMAF analysis");
        tracing::info!("Docker command: {} {}", self.docker, args.join(" "));

        let lines = run_streamed(
            Command::new(&self.docker).args(&args),
            "docker",
            PROGRESS_EVERY,
        )?;
        tracing::info!(lines, "VMAF analysis completed");

        let reports = match distorted.parent() {
            Some(dir) => find_reports(dir)?,
            None => Vec::new(),
        };
        if reports.is_empty() {
            tracing::warn!("No VMAF report found next to the distorted input");
        }
        for report in &reports {
            tracing::info!(path = %report.display(), "VMAF report");
        }
        Ok(reports)
    }
}
