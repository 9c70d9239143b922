//! [`SqliteStore`] -- SQLite-backed storage implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::sqlite::schema;

/// SQLite-backed implementation of the [`Storage`](crate::traits::Storage) trait.
///
/// Wraps a [`rusqlite::Connection`] in a `Mutex`. Every public method holds
/// the lock for the duration of its SQL, so a multi-statement write is never
/// interleaved with another caller on the same store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(?path, "opening SQLite database");

        let conn = Connection::open(path).map_err(|e| {
            StorageError::Connection(format!("failed to open {}: {e}", path.display()))
        })?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory SQLite database");
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("failed to open in-memory db: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquires the connection lock. Helper used by all operation modules.
    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Connection(format!("mutex poisoned: {e}")))
    }
}

/// Begins a write transaction that takes the database write lock up front,
/// so a concurrent writer fails fast with `SQLITE_BUSY` instead of midway.
pub(crate) fn begin_immediate(conn: &Connection) -> Result<rusqlite::Transaction<'_>> {
    rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| StorageError::Transaction(format!("failed to begin: {e}")))
}

pub(crate) fn commit(tx: rusqlite::Transaction<'_>) -> Result<()> {
    tx.commit()
        .map_err(|e| StorageError::Transaction(format!("failed to commit: {e}")))
}

/// Sets connection pragmas (WAL mode, foreign keys, busy timeout).
fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(|e| StorageError::Connection(format!("failed to set pragmas: {e}")))
}

/// Creates all tables and indexes if they do not exist and seeds the
/// default config.
fn init_schema(conn: &Connection) -> Result<()> {
    let version = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .ok()
        .and_then(|v| v.parse::<i32>().ok());
    if let Some(v) = version {
        if v >= schema::CURRENT_SCHEMA_VERSION {
            debug!(version = v, "schema already at current version, skipping init");
            return Ok(());
        }
    }

    for stmt in schema::SCHEMA_STATEMENTS {
        conn.execute_batch(stmt).map_err(|e| StorageError::Migration {
            name: "init_schema".into(),
            reason: format!("{e}\nStatement: {}", truncate(stmt.trim(), 120)),
        })?;
    }

    for &(key, value) in schema::DEFAULT_CONFIG {
        conn.execute(
            "INSERT OR IGNORE INTO config (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )
        .map_err(|e| StorageError::Migration {
            name: "default_config".into(),
            reason: format!("failed to insert {key}: {e}"),
        })?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![schema::CURRENT_SCHEMA_VERSION.to_string()],
    )
    .map_err(|e| StorageError::Migration {
        name: "schema_version".into(),
        reason: e.to_string(),
    })?;

    info!("schema initialized (version {})", schema::CURRENT_SCHEMA_VERSION);
    Ok(())
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_seeds_config() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let prefix: String = conn
            .query_row(
                "SELECT value FROM config WHERE key = 'issue_prefix'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(prefix, "bd");
    }

    #[test]
    fn init_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        init_schema(&conn).unwrap();
        let version: String = conn
            .query_row(
                "SELECT value FROM config WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, schema::CURRENT_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beads.db");
        SqliteStore::open(&path).unwrap();
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.lock_conn().is_ok());
    }

    #[test]
    fn truncate_on_char_boundary() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ab", 3), "ab");
    }
}
