//! Stream-copy trimming with `ffmpeg`.

use std::path::Path;
use std::process::Command;

use vidsync_common::config::ToolPaths;
use vidsync_common::error::{VidsyncError, VidsyncResult};
use vidsync_core::pipeline::Transcoder;
use vidsync_model::sync::TrimSpec;

use crate::process::run_captured;

/// Arguments that copy `input` from `trim.start_secs` into `output`.
pub fn trim_args(input: &Path, output: &Path, trim: &TrimSpec) -> Vec<String> {
    vec![
        "-ss".to_string(),
        trim.seek_arg(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-c".to_string(),
        "copy".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// [`Transcoder`] that cuts without re-encoding.
#[derive(Debug, Clone)]
pub struct FfmpegTrimmer {
    ffmpeg: String,
}

impl FfmpegTrimmer {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn from_tools(tools: &ToolPaths) -> Self {
        Self::new(tools.ffmpeg.clone())
    }
}

impl Transcoder for FfmpegTrimmer {
    fn trim(&self, input: &Path, output: &Path, trim: &TrimSpec) -> VidsyncResult<()> {
        let args = trim_args(input, output, trim);
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            start = %trim.seek_arg(),
            sync_secs = trim.sync_secs,
            buffer_secs = trim.buffer_secs,
            "Trimming video"
        );
        tracing::info!("FFmpeg command: {} {}", self.ffmpeg, args.join(" "));

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        run_captured(Command::new(&self.ffmpeg).args(&args), "ffmpeg")?;

        let size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(VidsyncError::pipeline(format!(
                "ffmpeg produced no output at {}",
                output.display()
            )));
        }
        tracing::info!(
            output = %output.display(),
            size_mb = size as f64 / (1024.0 * 1024.0),
            "Video trimmed"
        );
        Ok(())
    }
}
