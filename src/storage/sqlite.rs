//! SQLite storage backend for delve

use super::traits::{KeyValueStore, OpenStore, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite-backed key-value store
///
/// Uses a single `kv` table in one database file. Thread-safe via an
/// internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Readers in other processes keep working during a write
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn();
        let removed = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_get_missing_key() {
        let store = create_test_store();
        assert_eq!(store.get("absent").unwrap(), None);
    }

    #[test]
    fn test_set_and_get() {
        let store = create_test_store();
        store.set("history", "[1,2,3]").unwrap();
        assert_eq!(store.get("history").unwrap().as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn test_set_overwrites() {
        let store = create_test_store();
        store.set("history", "old").unwrap();
        store.set("history", "new").unwrap();
        assert_eq!(store.get("history").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_remove() {
        let store = create_test_store();
        store.set("history", "x").unwrap();
        assert!(store.remove("history").unwrap());
        assert!(!store.remove("history").unwrap());
        assert_eq!(store.get("history").unwrap(), None);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("delve.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("history", "kept").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("history").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("wal.db")).unwrap();
        let conn = store.conn();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_reads_see_writes_from_another_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let ours = SqliteStore::open(&path).unwrap();
        let theirs = SqliteStore::open(&path).unwrap();

        ours.set("history", "first").unwrap();
        theirs.set("history", "second").unwrap();

        assert_eq!(ours.get("history").unwrap().as_deref(), Some("second"));
    }
}
