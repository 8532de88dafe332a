//! Core data structures: segments and the query records that hold them

mod node;
mod record;


pub use node::{Segment, SegmentId};
pub use record::{normalize_query, DedupKey, QueryRecord, RecordId};
