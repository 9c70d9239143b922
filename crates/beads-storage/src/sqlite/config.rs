//! Config key-value store operations for [`SqliteStore`].

use rusqlite::{Connection, params};
use std::collections::HashMap;

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;

pub(crate) fn set_config_on_conn(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub(crate) fn get_config_on_conn(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row(
        "SELECT value FROM config WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("config", key),
        other => StorageError::Query(other),
    })
}

impl SqliteStore {
    pub fn set_config_impl(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        set_config_on_conn(&conn, key, value)
    }

    pub fn get_config_impl(&self, key: &str) -> Result<String> {
        let conn = self.lock_conn()?;
        get_config_on_conn(&conn, key)
    }

    pub fn get_all_config_impl(&self) -> Result<HashMap<String, String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<rusqlite::Result<HashMap<_, _>>>()
            .map_err(StorageError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn set_get_overwrite() {
        let store = test_store();
        store.set_config_impl("issue_prefix", "t").unwrap();
        assert_eq!(store.get_config_impl("issue_prefix").unwrap(), "t");
        store.set_config_impl("issue_prefix", "u").unwrap();
        assert_eq!(store.get_config_impl("issue_prefix").unwrap(), "u");
    }

    #[test]
    fn get_config_not_found() {
        let store = test_store();
        assert!(store.get_config_impl("nonexistent").unwrap_err().is_not_found());
    }

    #[test]
    fn all_config_includes_schema_version() {
        let store = test_store();
        let config = store.get_all_config_impl().unwrap();
        assert!(config.contains_key("schema_version"));
    }
}
