use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::StorageError;
use crate::storage::KeyValueStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#;

/// Open (or create) the studio database. Pass `None` for an in-memory database.
pub fn open_database(path: Option<&Path>) -> Result<Connection> {
    let conn = match path {
        Some(p) => Connection::open(p).context("Failed to open studio database")?,
        None => Connection::open_in_memory().context("Failed to open in-memory database")?,
    };

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to set PRAGMA options")?;

    conn.execute_batch(SCHEMA)
        .context("Failed to create kv_store schema")?;

    Ok(conn)
}

pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("Failed to read key '{}'", key))
}

/// Insert or overwrite a value and stamp `updated_at`.
pub fn put_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
    )
    .with_context(|| format!("Failed to write key '{}'", key))?;
    Ok(())
}

pub fn delete_value(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
        .with_context(|| format!("Failed to delete key '{}'", key))?;
    Ok(())
}

/// Bytes held by every entry except `key`.
pub fn used_bytes_excluding(conn: &Connection, key: &str) -> Result<usize> {
    let used: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM kv_store WHERE key != ?1",
            params![key],
            |row| row.get(0),
        )
        .context("Failed to measure kv_store usage")?;
    Ok(used.max(0) as usize)
}

/// SQLite-backed [`KeyValueStore`] with an optional byte quota.
///
/// The quota is checked before each write against the bytes of all other
/// entries plus the new one.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    quota: Option<usize>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("quota", &self.quota)
            .finish()
    }
}

impl SqliteStore {
    /// Open a database file, creating it if needed.
    pub fn open(path: &Path) -> std::result::Result<Self, StorageError> {
        Ok(Self::from_connection(open_database(Some(path))?))
    }

    pub fn in_memory() -> std::result::Result<Self, StorageError> {
        Ok(Self::from_connection(open_database(None)?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            quota: None,
        }
    }

    /// Reject writes that would take the store past `bytes`.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
        let conn = self.conn.lock();
        Ok(get_value(&conn, key)?)
    }

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
        let conn = self.conn.lock();

        if let Some(quota) = self.quota {
            let requested = used_bytes_excluding(&conn, key)? + key.len() + value.len();
            if requested > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    quota,
                });
            }
        }

        Ok(put_value(&conn, key, value)?)
    }

    fn delete(&self, key: &str) -> std::result::Result<(), StorageError> {
        let conn = self.conn.lock();
        Ok(delete_value(&conn, key)?)
    }
}
