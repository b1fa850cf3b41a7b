//! Persistent command state
//!
//! A tiny key/value table backed by SQLite in WAL mode. Command handlers
//! read and write bot state here (e.g. the current project description).
//! Every write commits immediately; writes are rare (administrator-issued
//! commands), so correctness wins over throughput.

use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Key/value store for command state, durable across restarts
pub struct CommandStore {
    conn: Mutex<Connection>,
}

impl CommandStore {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to open command store {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        // journal_mode returns the resulting mode as a row
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS commands (
                name TEXT PRIMARY KEY,
                value TEXT
            )",
            [],
        )?;
        Ok(())
    }

    /// Read a value by key; unset keys read as the empty string
    pub fn get(&self, key: &str) -> Result<String> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM commands WHERE name = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or_default())
    }

    /// Upsert a value by key; commits before returning
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO commands (name, value)
             VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        tracing::debug!(key, "Store write committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let store = CommandStore::open_in_memory().unwrap();
        store.set("project", "building a bot").unwrap();
        assert_eq!(store.get("project").unwrap(), "building a bot");
    }

    #[test]
    fn test_unset_key_reads_empty() {
        let store = CommandStore::open_in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), "");
    }

    #[test]
    fn test_upsert_overwrites() {
        let store = CommandStore::open_in_memory().unwrap();
        store.set("project", "first").unwrap();
        store.set("project", "second").unwrap();
        assert_eq!(store.get("project").unwrap(), "second");
    }

    #[test]
    fn test_durable_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.sqlite3");

        {
            let store = CommandStore::open(&path).unwrap();
            store.set("project", "persisted").unwrap();
        }

        let store = CommandStore::open(&path).unwrap();
        assert_eq!(store.get("project").unwrap(), "persisted");
    }

    #[test]
    fn test_keys_are_independent() {
        let store = CommandStore::open_in_memory().unwrap();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.get("a").unwrap(), "1");
        assert_eq!(store.get("b").unwrap(), "2");
    }
}
