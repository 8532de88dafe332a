//! QueryRecord: one completed query and the segments it produced

use super::node::{Segment, SegmentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a query record.
///
/// Always rendered as a lowercase hyphenated UUID, which is the shape
/// the snapshot codec accepts in addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new random RecordId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a RecordId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A completed query in the persistent history log.
///
/// A record with neither `parent_id` nor `source_segment_id` is a root
/// search; one with both is an expansion. Records are never mutated after
/// they are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub id: RecordId,
    /// The literal search text, or an expansion directive
    pub query: String,
    pub segments: Vec<Segment>,
    pub timestamp: DateTime<Utc>,
    /// The record that produced the segment being expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RecordId>,
    /// The segment that triggered this expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_segment_id: Option<SegmentId>,
}

impl QueryRecord {
    pub fn new(
        query: impl Into<String>,
        segments: Vec<Segment>,
        parent_id: Option<RecordId>,
        source_segment_id: Option<SegmentId>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            query: query.into(),
            segments,
            timestamp: Utc::now(),
            parent_id,
            source_segment_id,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.source_segment_id.is_none()
    }

    pub fn is_expansion(&self) -> bool {
        self.parent_id.is_some() && self.source_segment_id.is_some()
    }

    /// Whether this record answers the given de-duplication key.
    pub fn matches(&self, key: &DedupKey) -> bool {
        (self.is_root() || self.is_expansion())
            && normalize_query(&self.query) == key.query
            && self.source_segment_id == key.source_segment_id
            && self.parent_id == key.parent_id
    }
}

/// Case-insensitive, whitespace-trimmed form used for query matching
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// The triple that identifies "the same query" for caching and merging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub query: String,
    pub source_segment_id: Option<SegmentId>,
    pub parent_id: Option<RecordId>,
}

impl DedupKey {
    pub fn new(
        query: &str,
        source_segment_id: Option<SegmentId>,
        parent_id: Option<RecordId>,
    ) -> Self {
        Self {
            query: normalize_query(query),
            source_segment_id,
            parent_id,
        }
    }

    /// A key with only one of the two links set names neither a root nor
    /// an expansion, and never matches anything.
    pub fn is_well_formed(&self) -> bool {
        self.source_segment_id.is_some() == self.parent_id.is_some()
    }
}
