//! Segment: a titled unit of explanation in the exploration tree

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(Uuid);

impl SegmentId {
    /// Create a new random SegmentId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a SegmentId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the exploration tree.
///
/// Segments are immutable once created. Expanding one never changes it;
/// the expansion produces new segments whose `parent_id` points back here.
/// The tree lives in flat collections and is resolved by parent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: SegmentId,
    pub title: String,
    /// Short explanation, nominally capped at ~50 words (not enforced)
    pub content: String,
    /// `None` for a root segment (direct result of a fresh search)
    pub parent_id: Option<SegmentId>,
}

impl Segment {
    /// Create a root segment with a fresh id
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: SegmentId::new(),
            title: title.into(),
            content: content.into(),
            parent_id: None,
        }
    }

    /// Create a segment with a fresh id under the given parent
    pub fn child_of(
        parent: SegmentId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            parent_id: Some(parent),
            ..Self::new(title, content)
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Find the direct children of `parent` in a flat segment collection
    pub fn children_of<'a>(
        parent: SegmentId,
        segments: &'a [Segment],
    ) -> impl Iterator<Item = &'a Segment> + 'a {
        segments
            .iter()
            .filter(move |s| s.parent_id == Some(parent))
    }
}
