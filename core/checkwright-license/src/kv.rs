//! Durable key-value backends for license state.
//!
//! The license store only needs string keys and string values, plus the
//! ability to apply several writes as one unit so the structured record and
//! its legacy flags never disagree.

use crate::error::{LicenseError, LicenseResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

/// A single write in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    /// Insert or replace a value.
    Set(String, String),
    /// Delete a key if present.
    Remove(String),
}

impl KvOp {
    /// Shorthand for [`KvOp::Set`].
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set(key.into(), value.into())
    }

    /// Shorthand for [`KvOp::Remove`].
    pub fn remove(key: impl Into<String>) -> Self {
        Self::Remove(key.into())
    }
}

/// Storage backend trait for license state.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> LicenseResult<Option<String>>;

    /// Applies every op in `batch`, or none of them.
    fn apply(&self, batch: &[KvOp]) -> LicenseResult<()>;

    /// Returns every stored pair, ordered by key.
    fn snapshot(&self) -> LicenseResult<BTreeMap<String, String>>;
}

/// In-memory backend.
///
/// Useful for testing or ephemeral installs.
#[derive(Debug, Default)]
pub struct MemoryKv {
    store: RwLock<BTreeMap<String, String>>,
}

impl MemoryKv {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> LicenseError {
    LicenseError::Storage("store lock poisoned".to_string())
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        Ok(self.store.read().map_err(poisoned)?.get(key).cloned())
    }

    fn apply(&self, batch: &[KvOp]) -> LicenseResult<()> {
        // A single write guard makes the batch atomic for readers.
        let mut store = self.store.write().map_err(poisoned)?;
        for op in batch {
            match op {
                KvOp::Set(k, v) => {
                    store.insert(k.clone(), v.clone());
                }
                KvOp::Remove(k) => {
                    store.remove(k);
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> LicenseResult<BTreeMap<String, String>> {
        Ok(self.store.read().map_err(poisoned)?.clone())
    }
}

/// SQLite-backed store. One row per key; each batch is one transaction.
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKv {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> LicenseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LicenseError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| LicenseError::Storage(format!("failed to open license store: {e}")))?;
        Self::init(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> LicenseResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LicenseError::Storage(format!("failed to open in-memory license store: {e}"))
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> LicenseResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS license_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| LicenseError::Storage(format!("failed to init license schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl KeyValueStore for SqliteKv {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM license_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn apply(&self, batch: &[KvOp]) -> LicenseResult<()> {
        let mut conn = self.conn.lock().map_err(poisoned)?;
        let tx = conn.transaction()?;
        for op in batch {
            match op {
                KvOp::Set(k, v) => {
                    tx.execute(
                        "INSERT OR REPLACE INTO license_kv (key, value) VALUES (?1, ?2)",
                        params![k, v],
                    )?;
                }
                KvOp::Remove(k) => {
                    tx.execute("DELETE FROM license_kv WHERE key = ?1", params![k])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn snapshot(&self) -> LicenseResult<BTreeMap<String, String>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare("SELECT key, value FROM license_kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (k, v): (String, String) = row?;
            out.insert(k, v);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for SqliteKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKv").finish_non_exhaustive()
    }
}
