//! Storage trait definitions

use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable key-value storage scoped to the local device.
///
/// The exploration core treats this as synchronous get/set of whole
/// serialized blobs. Implementations must be thread-safe (Send + Sync).
pub trait KeyValueStore: Send + Sync {
    /// Read the blob stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the blob stored under `key`
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`, returning whether it existed
    fn remove(&self, key: &str) -> StorageResult<bool>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: KeyValueStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
