//! Shared state for marker-reading scans.

use vidsync_model::event::EventLog;

use crate::artifacts::ArtifactSink;
use crate::marker::MarkerReader;

/// Borrowed collaborators a marker scan reads with and reports into.
pub struct ScanContext<'a> {
    pub reader: &'a mut MarkerReader,
    pub events: &'a mut EventLog,
    pub artifacts: &'a dyn ArtifactSink,
}

impl<'a> ScanContext<'a> {
    pub fn new(
        reader: &'a mut MarkerReader,
        events: &'a mut EventLog,
        artifacts: &'a dyn ArtifactSink,
    ) -> Self {
        Self {
            reader,
            events,
            artifacts,
        }
    }
}
