//! SQLite implementation of the durable session tier.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use strata_session::{DurableStore, StoreError};
use tracing::{debug, info};

use crate::error::{Result, SqliteStoreError, classify};

/// Current schema version, tracked in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// Durable session tier backed by a single SQLite table.
///
/// Thread-safe via an internal `Mutex<Connection>`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self::from_connection(conn)?;
        info!("Session store opened at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored sessions.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete sessions not written since `cutoff`. Returns how many were removed.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn.lock().execute(
            "DELETE FROM sessions WHERE updated_at < ?1",
            params![timestamp(cutoff)],
        )?;
        if removed > 0 {
            info!(removed, %cutoff, "Pruned stale sessions");
        }
        Ok(removed)
    }

    /// When `key` was last written, if it exists.
    pub fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT updated_at FROM sessions WHERE id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }
}

/// Fixed-width UTC rendering so `updated_at` compares correctly as text.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn migrate(conn: &Connection) -> Result<()> {
    let current: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current == SCHEMA_VERSION {
        debug!("Session schema up to date (version {})", current);
        return Ok(());
    }
    if current != 0 {
        return Err(SqliteStoreError::Migration(format!(
            "unknown schema version {}",
            current
        )));
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            payload BLOB NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at);",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    info!("Session schema created (version {})", SCHEMA_VERSION);
    Ok(())
}

impl DurableStore for SqliteStore {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        self.conn
            .lock()
            .query_row(
                "SELECT payload FROM sessions WHERE id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify)
    }

    fn put(&self, key: &str, value: &[u8]) -> std::result::Result<(), StoreError> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO sessions (id, payload, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
                params![key, value, timestamp(Utc::now())],
            )
            .map(|_| ())
            .map_err(classify)
    }

    fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM sessions WHERE id = ?1", params![key])
            .map(|_| ())
            .map_err(classify)
    }
}
