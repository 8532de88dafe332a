//! Delve: Recursive Topic Exploration
//!
//! Ask a question, get a short list of titled explanation segments, then
//! expand any segment into children of its own. Every answer is stored in
//! a persistent history and addressable as `/q/{record id}`, so a tree of
//! explanations can be revisited without asking the model again.
//!
//! # Core Concepts
//!
//! - **Segments**: titled explanations linked to the segment they expand
//! - **Query records**: one stored answer, keyed for de-duplication by
//!   normalized query text, source segment and parent record
//! - **Explorer**: the request state machine (history lookup, in-flight
//!   sharing, cancellation, retries)
//! - **Snapshots**: address-bar paths that restore a stored answer
//!
//! # Example
//!
//! ```
//! use delve::{ExploreConfig, Explorer, MemoryStore, MockClient, QueryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(QueryStore::new(Arc::new(MemoryStore::new())));
//! let explorer = Explorer::new(
//!     Arc::new(MockClient::available()),
//!     store,
//!     ExploreConfig::default(),
//! );
//! assert!(explorer.state().segments.is_empty());
//! ```

pub mod config;
pub mod context;
pub mod explore;
pub mod llm;
pub mod parser;
mod segment;
pub mod snapshot;
pub mod storage;

pub use config::{ConfigError, ExploreConfig, LlmConfig};
pub use context::{ContextBuilder, SegmentContext};
pub use explore::{
    CancellationToken, Completed, ExploreError, Explorer, ExplorerState, Lease, Outcome, Phase,
    Prefetcher,
};
pub use llm::{CompletionClient, CompletionRequest, HttpClient, LlmError, MockClient};
pub use parser::{parse_segments, ParseError};
pub use segment::{normalize_query, DedupKey, QueryRecord, RecordId, Segment, SegmentId};
pub use snapshot::{AddressSync, MemoryHistory, Navigator};
pub use storage::{
    KeyValueStore, MemoryStore, OpenStore, QueryStore, SqliteStore, StorageError, StorageResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
