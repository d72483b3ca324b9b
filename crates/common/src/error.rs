//! Error types shared across VidSync crates.

use std::path::PathBuf;

/// Top-level error type for VidSync operations.
#[derive(Debug, thiserror::Error)]
pub enum VidsyncError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("{tool} exited with {status}: {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VidsyncError.
pub type VidsyncResult<T> = Result<T, VidsyncError>;

impl VidsyncError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Build an error for an external process that exited unsuccessfully.
    ///
    /// Both output streams are kept verbatim so the caller can surface them.
    pub fn external_tool(
        tool: impl Into<String>,
        status: impl std::fmt::Display,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            status: status.to_string(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the error came from an external tool exiting non-zero.
    pub fn is_external_tool(&self) -> bool {
        matches!(self, Self::ExternalTool { .. })
    }
}
