//! Structured event log for alignment runs.
//!
//! Every scanned frame and every stage outcome is recorded as a
//! [`SyncEvent`]. The log is append-only and serializes to JSONL, one
//! event per line, so a run can be inspected or asserted on after the fact.

use serde::{Deserialize, Serialize};

use crate::detection::Detection;

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SyncSearch,
    FallbackDifference,
    Trim,
    PostTrimRead,
    ReferenceLocate,
    MetricInvoke,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::SyncSearch => "sync_search",
            Stage::FallbackDifference => "fallback_difference",
            Stage::Trim => "trim",
            Stage::PostTrimRead => "post_trim_read",
            Stage::ReferenceLocate => "reference_locate",
            Stage::MetricInvoke => "metric_invoke",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<Detection>,

    #[serde(flatten)]
    pub kind: EventKind,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A frame was decoded and examined.
    FrameScanned,

    /// Two different qualifying markers were read in succession.
    TransitionFound { from: u64, to: u64 },

    /// The scan window ended without a result.
    WindowExhausted { frames_scanned: u64 },

    /// Frame-difference score that became the new maximum.
    DifferenceMax { score: u64 },

    /// The target marker was found.
    MarkerLocated { marker: u64 },

    /// The stage fell back to degraded behavior.
    Degraded { reason: String },

    StageCompleted,

    StageFailed { message: String },
}

impl SyncEvent {
    /// Event tied to a specific frame.
    pub fn frame(
        stage: Stage,
        frame_index: u64,
        timestamp_secs: f64,
        detection: Option<Detection>,
        kind: EventKind,
    ) -> Self {
        Self {
            stage,
            frame_index: Some(frame_index),
            timestamp_secs: Some(timestamp_secs),
            detection,
            kind,
        }
    }

    /// Event about a stage as a whole.
    pub fn stage(stage: Stage, kind: EventKind) -> Self {
        Self {
            stage,
            frame_index: None,
            timestamp_secs: None,
            detection: None,
            kind,
        }
    }
}

/// Append-only log of [`SyncEvent`]s with query helpers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<SyncEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SyncEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SyncEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events recorded for one stage, in order.
    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &SyncEvent> {
        self.events.iter().filter(move |e| e.stage == stage)
    }

    /// Number of frames examined by a stage.
    pub fn frames_scanned(&self, stage: Stage) -> usize {
        self.for_stage(stage)
            .filter(|e| e.kind == EventKind::FrameScanned)
            .count()
    }

    /// Detections read by a stage, paired with their frame index.
    pub fn detections(&self, stage: Stage) -> Vec<(u64, Detection)> {
        self.for_stage(stage)
            .filter_map(|e| match (e.frame_index, e.detection) {
                (Some(index), Some(detection)) if e.kind == EventKind::FrameScanned => {
                    Some((index, detection))
                }
                _ => None,
            })
            .collect()
    }

    /// Degradation reasons across all stages.
    pub fn degradations(&self) -> Vec<(Stage, &str)> {
        self.events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Degraded { reason } => Some((e.stage, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Append all events from another log.
    pub fn extend(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Serialize to JSONL format.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut output = String::new();
        for event in &self.events {
            output.push_str(&serde_json::to_string(event)?);
            output.push('\n');
        }
        Ok(output)
    }

    /// Parse a log from JSONL content (one JSON object per line).
    pub fn from_jsonl(jsonl: &str) -> Result<Self, serde_json::Error> {
        let events = jsonl
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(serde_json::from_str)
            .collect::<Result<Vec<SyncEvent>, _>>()?;
        Ok(Self { events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> EventLog {
        let mut log = EventLog::new();
        log.push(SyncEvent::frame(
            Stage::SyncSearch,
            0,
            0.0,
            Some(Detection::none()),
            EventKind::FrameScanned,
        ));
        log.push(SyncEvent::frame(
            Stage::SyncSearch,
            1,
            0.5,
            Some(Detection::new(5, 0.75)),
            EventKind::FrameScanned,
        ));
        log.push(SyncEvent::frame(
            Stage::SyncSearch,
            1,
            0.5,
            None,
            EventKind::TransitionFound { from: 4, to: 5 },
        ));
        log.push(SyncEvent::stage(
            Stage::PostTrimRead,
            EventKind::Degraded {
                reason: "no marker on first trimmed frame".to_string(),
            },
        ));
        log
    }

    #[test]
    fn test_queries() {
        let log = sample_log();
        assert_eq!(log.len(), 4);
        assert_eq!(log.frames_scanned(Stage::SyncSearch), 2);
        assert_eq!(log.frames_scanned(Stage::ReferenceLocate), 0);
        assert_eq!(
            log.detections(Stage::SyncSearch),
            vec![(0, Detection::none()), (1, Detection::new(5, 0.75))]
        );
        assert_eq!(
            log.degradations(),
            vec![(Stage::PostTrimRead, "no marker on first trimmed frame")]
        );
    }

    #[test]
    fn test_jsonl_shape() {
        let log = sample_log();
        let jsonl = log.to_jsonl().unwrap();
        let first = jsonl.lines().next().unwrap();
        assert!(first.contains("\"stage\":\"sync_search\""));
        assert!(first.contains("\"type\":\"frame_scanned\""));
        assert!(first.contains("\"frame_index\":0"));

        let stage_line = jsonl.lines().nth(3).unwrap();
        assert!(!stage_line.contains("frame_index"));
    }

    #[test]
    fn test_jsonl_parse_back() {
        let log = sample_log();
        let jsonl = format!("# run header\n{}", log.to_jsonl().unwrap());
        let parsed = EventLog::from_jsonl(&jsonl).unwrap();
        assert_eq!(parsed, log);
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::SyncSearch < Stage::Trim);
        assert!(Stage::ReferenceLocate < Stage::MetricInvoke);
    }
}
