//! Navigation state owned by the explorer

use crate::segment::{RecordId, Segment, SegmentId};

/// Where the explorer is in its request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// A root search is in flight
    Searching,
    /// A segment expansion (or extension) is in flight
    Expanding,
    /// The last request failed; holds until the next intent
    Error,
}

/// Snapshot of what the user is looking at.
///
/// Lives for the session only. The active record id is what survives, via
/// the address bar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExplorerState {
    pub query: String,
    pub segments: Vec<Segment>,
    pub phase: Phase,
    pub error: Option<String>,
    /// Segment whose expansion is in flight
    pub expanding: Option<SegmentId>,
    pub record_id: Option<RecordId>,
}

impl ExplorerState {
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Searching | Phase::Expanding)
    }

    pub(crate) fn begin(&mut self, phase: Phase, expanding: Option<SegmentId>) {
        self.phase = phase;
        self.expanding = expanding;
        self.error = None;
    }

    pub(crate) fn adopt(&mut self, query: &str, segments: Vec<Segment>, record_id: RecordId) {
        self.query = query.to_string();
        self.segments = segments;
        self.record_id = Some(record_id);
        self.settle();
    }

    /// Back to idle without touching the displayed segments
    pub(crate) fn settle(&mut self) {
        self.phase = Phase::Idle;
        self.expanding = None;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.phase = Phase::Error;
        self.expanding = None;
        self.error = Some(message);
    }
}
