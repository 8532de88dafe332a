//! Storage backends for delve
//!
//! Durable state goes through the `KeyValueStore` trait. `SqliteStore` is
//! the on-disk backend, `MemoryStore` the ephemeral one, and `QueryStore`
//! keeps the query history log on top of either.

mod history;
mod memory;
mod sqlite;
mod traits;

pub use history::{QueryStore, DEFAULT_MAX_RECORDS, HISTORY_KEY};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, OpenStore, StorageError, StorageResult};
