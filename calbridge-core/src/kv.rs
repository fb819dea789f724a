// ABOUTME: Key-value persistence used for credentials, handshake state, and the event cache.
// ABOUTME: SQLite-backed store for the server, in-memory store for tests and one-shot runs.
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::auth::constant_time_eq;

/// Byte-oriented key-value storage
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    /// Delete `key` only if it currently holds `expected`; returns whether it did.
    /// The check and the delete happen under one lock.
    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool>;
}

#[derive(Clone)]
pub struct SqliteKvStore {
    db: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteKvStore {
    /// Open (or create) `calbridge.db` inside the workspace directory
    pub fn open<P: AsRef<Path>>(workspace_path: P) -> Result<Self> {
        let workspace_path = workspace_path.as_ref();
        std::fs::create_dir_all(workspace_path).context("Failed to create workspace directory")?;

        let db_path = workspace_path.join("calbridge.db");
        let conn = Connection::open(&db_path).context("Failed to open SQLite database")?;
        Self::init_schema(&conn)?;

        tracing::info!(db = %db_path.display(), "KV store initialized");

        Ok(SqliteKvStore {
            db: Arc::new(Mutex::new(conn)),
            path: Some(db_path),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init_schema(&conn)?;
        Ok(SqliteKvStore {
            db: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create kv table")?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        let mut stmt = db.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let value = stmt.query_row(params![key], |row| row.get::<_, Vec<u8>>(0));

        match value {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read key {}", key)),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        db.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )
        .with_context(|| format!("Failed to write key {}", key))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        db.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to delete key {}", key))?;
        Ok(())
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let db = self
            .db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))?;
        let current = db.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, Vec<u8>>(0),
        );
        let current = match current {
            Ok(v) => v,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(false),
            Err(e) => return Err(e).with_context(|| format!("Failed to read key {}", key)),
        };
        if !constant_time_eq(&current, expected) {
            return Ok(false);
        }
        db.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to delete key {}", key))?;
        Ok(true)
    }
}

/// Process-local store; contents vanish with the process
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("KV mutex poisoned: {}", e))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("KV mutex poisoned: {}", e))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("KV mutex poisoned: {}", e))?;
        entries.remove(key);
        Ok(())
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("KV mutex poisoned: {}", e))?;
        let matches = entries
            .get(key)
            .is_some_and(|current| constant_time_eq(current, expected));
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("user_1", b"first").unwrap();
        assert_eq!(store.get("user_1").unwrap(), Some(b"first".to_vec()));

        store.set("user_1", b"second").unwrap();
        assert_eq!(store.get("user_1").unwrap(), Some(b"second".to_vec()));

        store.delete("user_1").unwrap();
        assert_eq!(store.get("user_1").unwrap(), None);

        // Deleting an absent key is not an error
        store.delete("user_1").unwrap();

        store.set("oauth_state_1", b"token").unwrap();
        assert!(!store.compare_and_delete("oauth_state_1", b"other").unwrap());
        assert_eq!(store.get("oauth_state_1").unwrap(), Some(b"token".to_vec()));
        assert!(store.compare_and_delete("oauth_state_1", b"token").unwrap());
        assert_eq!(store.get("oauth_state_1").unwrap(), None);
        assert!(!store.compare_and_delete("oauth_state_1", b"token").unwrap());
    }

    #[test]
    fn test_sqlite_store_semantics() {
        let store = SqliteKvStore::in_memory().unwrap();
        exercise(&store);
    }

    #[test]
    fn test_memory_store_semantics() {
        let store = MemoryKvStore::new();
        exercise(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = SqliteKvStore::open(tmp.path()).unwrap();
            store.set("calendar_events", b"{}").unwrap();
            assert!(store.path().unwrap().ends_with("calbridge.db"));
        }
        let store = SqliteKvStore::open(tmp.path()).unwrap();
        assert_eq!(store.get("calendar_events").unwrap(), Some(b"{}".to_vec()));
    }
}
