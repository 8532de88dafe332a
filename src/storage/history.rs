//! Persistent query history
//!
//! A content-addressable log of completed queries, most recent first,
//! kept as one JSON blob under a reserved key of a [`KeyValueStore`].
//!
//! Storage faults never escape this type: an unreadable log degrades to
//! an empty one, and writes are best-effort. Each operation is a whole-log
//! read-modify-write serialized by an in-process mutex; separate processes
//! sharing the same backend are last-writer-wins.

use super::traits::{KeyValueStore, StorageError};
use crate::segment::{DedupKey, QueryRecord, RecordId, Segment, SegmentId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// The single backend key the history log lives under
pub const HISTORY_KEY: &str = "delve.query_history";

/// Records kept before the oldest are pruned
pub const DEFAULT_MAX_RECORDS: usize = 100;

pub struct QueryStore {
    backend: Arc<dyn KeyValueStore>,
    max_records: usize,
    write_lock: Mutex<()>,
}

impl QueryStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            max_records: DEFAULT_MAX_RECORDS,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    fn load(&self) -> Vec<QueryRecord> {
        let raw = match self.backend.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "query history unreadable, treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "query history corrupted, treating as empty");
                Vec::new()
            }
        }
    }

    fn persist(&self, records: &[QueryRecord]) {
        let result = serde_json::to_string(records)
            .map_err(StorageError::from)
            .and_then(|json| self.backend.set(HISTORY_KEY, &json));
        if let Err(e) = result {
            warn!(error = %e, records = records.len(), "failed to write query history");
        }
    }

    /// Append a record at the head of the log and return its id.
    ///
    /// If a record with the same de-duplication key already exists, that
    /// record's id is returned and nothing is written.
    pub fn save(
        &self,
        query: &str,
        segments: Vec<Segment>,
        parent_id: Option<RecordId>,
        source_segment_id: Option<SegmentId>,
    ) -> RecordId {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.load();

        let key = DedupKey::new(query, source_segment_id, parent_id);
        if let Some(existing) = records.iter().find(|r| r.matches(&key)) {
            debug!(id = %existing.id, "query already recorded, keeping earlier record");
            return existing.id;
        }

        let record = QueryRecord::new(query.trim(), segments, parent_id, source_segment_id);
        let id = record.id;
        records.insert(0, record);

        if records.len() > self.max_records {
            let pruned = records.len() - self.max_records;
            records.truncate(self.max_records);
            debug!(pruned, "pruned oldest query records");
        }

        self.persist(&records);
        id
    }

    /// Most recent record answering `(query, source_segment_id, parent_id)`.
    ///
    /// Query text is compared trimmed and case-insensitively; the links
    /// must match exactly. Supplying only one of the two links matches
    /// nothing.
    pub fn find_existing(
        &self,
        query: &str,
        source_segment_id: Option<SegmentId>,
        parent_id: Option<RecordId>,
    ) -> Option<QueryRecord> {
        self.find_by_key(&DedupKey::new(query, source_segment_id, parent_id))
    }

    pub fn find_by_key(&self, key: &DedupKey) -> Option<QueryRecord> {
        if !key.is_well_formed() {
            return None;
        }
        self.load().into_iter().find(|r| r.matches(key))
    }

    pub fn get_by_id(&self, id: RecordId) -> Option<QueryRecord> {
        self.load().into_iter().find(|r| r.id == id)
    }

    /// Delete one record, returning whether it existed
    pub fn delete_by_id(&self, id: RecordId) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.load();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return false;
        }
        self.persist(&records);
        true
    }

    pub fn clear_all(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.backend.remove(HISTORY_KEY) {
            warn!(error = %e, "failed to clear query history");
        }
    }

    /// All records, most recent first
    pub fn list(&self) -> Vec<QueryRecord> {
        self.load()
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The record and its ancestors via `parent_id`, nearest first.
    ///
    /// Stops at a root, at a dangling link, or on a cycle.
    pub fn lineage(&self, id: RecordId) -> Vec<QueryRecord> {
        let records = self.load();
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);

        while let Some(current) = next {
            if !seen.insert(current) {
                break;
            }
            let Some(record) = records.iter().find(|r| r.id == current) else {
                break;
            };
            next = record.parent_id;
            chain.push(record.clone());
        }

        chain
    }

    /// Query text of the root search a record descends from
    pub fn root_query(&self, id: RecordId) -> Option<String> {
        self.lineage(id)
            .into_iter()
            .last()
            .filter(QueryRecord::is_root)
            .map(|r| r.query)
    }
}
