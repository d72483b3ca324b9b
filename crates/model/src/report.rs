//! Quality-metric report summary.
//!
//! Reads the JSON written by the VMAF tool and reduces it to per-frame
//! scores, pooled statistics, and a distribution over quality buckets.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors reading a quality report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read report: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
struct RawReport {
    #[serde(default)]
    frames: Vec<RawFrame>,

    #[serde(default)]
    pooled_metrics: Option<RawPooled>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFrame {
    #[serde(rename = "frameNum")]
    frame_num: u64,

    #[serde(default)]
    metrics: Option<RawMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMetrics {
    vmaf: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPooled {
    vmaf: Option<PooledScore>,
}

/// Pooled VMAF statistics as reported by the tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PooledScore {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub harmonic_mean: f64,
}

/// Quality category of a single frame score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBucket {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

impl QualityBucket {
    pub const ALL: [QualityBucket; 5] = [
        QualityBucket::Excellent,
        QualityBucket::Good,
        QualityBucket::Fair,
        QualityBucket::Poor,
        QualityBucket::Bad,
    ];

    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityBucket::Excellent
        } else if score >= 74.0 {
            QualityBucket::Good
        } else if score >= 58.0 {
            QualityBucket::Fair
        } else if score >= 38.0 {
            QualityBucket::Poor
        } else {
            QualityBucket::Bad
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityBucket::Excellent => "Excellent (90+)",
            QualityBucket::Good => "Good (74-90)",
            QualityBucket::Fair => "Fair (58-74)",
            QualityBucket::Poor => "Poor (38-58)",
            QualityBucket::Bad => "Bad (<38)",
        }
    }
}

/// Frame count for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    pub bucket: QualityBucket,
    pub frames: usize,
    pub percent: f64,
}

/// Per-frame scores and their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// `(frame number, vmaf score)` for every frame carrying a score.
    pub scores: Vec<(u64, f64)>,

    pub pooled: Option<PooledScore>,
}

impl QualityReport {
    /// Parse the tool's JSON output.
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let raw: RawReport = serde_json::from_str(json)?;
        let scores = raw
            .frames
            .iter()
            .filter_map(|frame| {
                frame
                    .metrics
                    .as_ref()
                    .and_then(|m| m.vmaf)
                    .map(|score| (frame.frame_num, score))
            })
            .collect();
        let pooled = raw.pooled_metrics.and_then(|p| p.vmaf);
        Ok(Self { scores, pooled })
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Mean of the per-frame scores, when any exist.
    pub fn mean_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.iter().map(|(_, s)| s).sum::<f64>() / self.scores.len() as f64)
    }

    /// Frame counts per bucket, in `QualityBucket::ALL` order.
    pub fn bucket_counts(&self) -> Vec<BucketCount> {
        let total = self.scores.len();
        QualityBucket::ALL
            .iter()
            .map(|&bucket| {
                let frames = self
                    .scores
                    .iter()
                    .filter(|(_, score)| QualityBucket::for_score(*score) == bucket)
                    .count();
                let percent = if total == 0 {
                    0.0
                } else {
                    frames as f64 * 100.0 / total as f64
                };
                BucketCount {
                    bucket,
                    frames,
                    percent,
                }
            })
            .collect()
    }

    /// Bucket distribution as CSV, followed by pooled statistics if present.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("Quality Category,Number of Frames,Percentage\n");
        for count in self.bucket_counts() {
            csv.push_str(&format!(
                "{},{},{:.1}%\n",
                count.bucket.label(),
                count.frames,
                count.percent
            ));
        }
        if let Some(pooled) = &self.pooled {
            csv.push('\n');
            csv.push_str("VMAF Statistic,Value\n");
            csv.push_str(&format!("Min,{:.2}\n", pooled.min));
            csv.push_str(&format!("Max,{:.2}\n", pooled.max));
            csv.push_str(&format!("Mean,{:.2}\n", pooled.mean));
            csv.push_str(&format!("Harmonic Mean,{:.2}\n", pooled.harmonic_mean));
        }
        csv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "frames": [
            {"frameNum": 0, "metrics": {"vmaf": 95.0}},
            {"frameNum": 1, "metrics": {"vmaf": 80.0}},
            {"frameNum": 2, "metrics": {"vmaf": 60.0}},
            {"frameNum": 3, "metrics": {"psnr": 40.0}},
            {"frameNum": 4, "metrics": {"vmaf": 10.0}}
        ],
        "pooled_metrics": {
            "vmaf": {"min": 10.0, "max": 95.0, "mean": 61.25, "harmonic_mean": 30.5}
        }
    }"#;

    #[test]
    fn test_bucket_edges() {
        assert_eq!(QualityBucket::for_score(90.0), QualityBucket::Excellent);
        assert_eq!(QualityBucket::for_score(89.99), QualityBucket::Good);
        assert_eq!(QualityBucket::for_score(74.0), QualityBucket::Good);
        assert_eq!(QualityBucket::for_score(58.0), QualityBucket::Fair);
        assert_eq!(QualityBucket::for_score(38.0), QualityBucket::Poor);
        assert_eq!(QualityBucket::for_score(37.9), QualityBucket::Bad);
    }

    #[test]
    fn test_parse_skips_frames_without_vmaf() {
        let report = QualityReport::from_json(SAMPLE).unwrap();
        assert_eq!(report.scores.len(), 4);
        assert_eq!(report.scores[3], (4, 10.0));
        assert_eq!(report.pooled.unwrap().harmonic_mean, 30.5);
        assert_eq!(report.mean_score(), Some(61.25));
    }

    #[test]
    fn test_bucket_counts() {
        let report = QualityReport::from_json(SAMPLE).unwrap();
        let counts = report.bucket_counts();
        let frames: Vec<usize> = counts.iter().map(|c| c.frames).collect();
        assert_eq!(frames, vec![1, 1, 1, 0, 1]);
        assert_eq!(counts[0].percent, 25.0);
    }

    #[test]
    fn test_csv_layout() {
        let report = QualityReport::from_json(SAMPLE).unwrap();
        let csv = report.to_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Quality Category,Number of Frames,Percentage"));
        assert_eq!(lines.next(), Some("Excellent (90+),1,25.0%"));
        assert!(csv.contains("Harmonic Mean,30.50"));
    }

    #[test]
    fn test_empty_report() {
        let report = QualityReport::from_json("{}").unwrap();
        assert!(report.scores.is_empty());
        assert_eq!(report.mean_score(), None);
        assert!(report.bucket_counts().iter().all(|c| c.percent == 0.0));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dist_vmaf.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let report = QualityReport::load(&path).unwrap();
        assert_eq!(report.scores.len(), 4);
    }
}
