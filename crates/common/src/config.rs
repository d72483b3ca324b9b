//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VidsyncError, VidsyncResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sync search and alignment parameters.
    pub sync: SyncDefaults,

    /// External tool locations.
    pub tools: ToolPaths,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default sync search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncDefaults {
    /// Minimum recognizer confidence (exclusive) for a marker reading to count.
    pub confidence_threshold: f32,

    /// Seconds scanned past the seek point while looking for a transition.
    pub transition_window_secs: f64,

    /// Seconds scanned by the frame-difference fallback.
    pub difference_window_secs: f64,

    /// Seconds of the reference scanned when locating a marker.
    pub locate_window_secs: f64,

    /// Consecutive confident, non-decreasing readings that differ from the
    /// previous value, required before a transition is accepted. 1 accepts
    /// the first differing reading.
    pub confirm_frames: usize,

    /// Seconds added after the rounded sync point before trimming.
    pub buffer_secs: f64,
}

/// External tool binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub tesseract: String,
    pub docker: String,

    /// Container image providing the quality-metric tool.
    pub vmaf_image: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vidsync_core=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path. Receives everything at debug level.
    pub file: Option<PathBuf>,
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            transition_window_secs: 30.0,
            difference_window_secs: 10.0,
            locate_window_secs: 60.0,
            confirm_frames: 1,
            buffer_secs: 5.0,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            tesseract: "tesseract".to_string(),
            docker: "docker".to_string(),
            vmaf_image: "gfdavila/easyvmaf".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl SyncDefaults {
    /// Reject values no search can run with.
    pub fn validate(&self) -> VidsyncResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(VidsyncError::config(format!(
                "sync.confidence_threshold must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }
        for (name, secs) in [
            ("sync.transition_window_secs", self.transition_window_secs),
            ("sync.difference_window_secs", self.difference_window_secs),
            ("sync.locate_window_secs", self.locate_window_secs),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(VidsyncError::config(format!(
                    "{name} must be a positive number of seconds, got {secs}"
                )));
            }
        }
        if self.confirm_frames == 0 {
            return Err(VidsyncError::config("sync.confirm_frames must be at least 1"));
        }
        if !self.buffer_secs.is_finite() || self.buffer_secs < 0.0 {
            return Err(VidsyncError::config(format!(
                "sync.buffer_secs must not be negative, got {}",
                self.buffer_secs
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vidsync").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_windows() {
        let config = AppConfig::default();
        assert_eq!(config.sync.confidence_threshold, 0.5);
        assert_eq!(config.sync.transition_window_secs, 30.0);
        assert_eq!(config.sync.difference_window_secs, 10.0);
        assert_eq!(config.sync.locate_window_secs, 60.0);
        assert_eq!(config.sync.confirm_frames, 1);
        assert_eq!(config.tools.vmaf_image, "gfdavila/easyvmaf");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sync": {"buffer_secs": 3.0}}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.sync.buffer_secs, 3.0);
        assert_eq!(config.sync.locate_window_secs, 60.0);
        assert_eq!(config.tools.ffmpeg, "ffmpeg");
    }

    #[test]
    fn test_garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.sync.buffer_secs, 5.0);
    }

    #[test]
    fn test_default_sync_settings_are_valid() {
        assert!(SyncDefaults::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_sync_settings_are_rejected() {
        let cases = [
            SyncDefaults {
                confidence_threshold: 1.5,
                ..SyncDefaults::default()
            },
            SyncDefaults {
                transition_window_secs: 0.0,
                ..SyncDefaults::default()
            },
            SyncDefaults {
                locate_window_secs: f64::NAN,
                ..SyncDefaults::default()
            },
            SyncDefaults {
                confirm_frames: 0,
                ..SyncDefaults::default()
            },
            SyncDefaults {
                buffer_secs: -1.0,
                ..SyncDefaults::default()
            },
        ];
        for sync in cases {
            let err = sync.validate().unwrap_err();
            assert!(matches!(err, VidsyncError::Config { .. }), "{sync:?}");
        }
    }

    #[test]
    fn test_zero_buffer_is_valid() {
        let sync = SyncDefaults {
            buffer_secs: 0.0,
            ..SyncDefaults::default()
        };
        assert!(sync.validate().is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.tools.docker = "podman".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.tools.docker, "podman");
    }
}
