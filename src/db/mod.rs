//! SQLite persistence layer for user preferences.
//!
//! Uses `rusqlite` with bundled SQLite. A single `preferences` table holds
//! JSON-encoded values keyed by name (per-indicator visibility flags,
//! automation toggles, selected network classes). Every write is committed
//! with `synchronous=FULL` before the call returns.

mod prefs;

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::Connection;

/// Manages the SQLite preference database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Private in-memory database; contents vanish with the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );
            ",
        )?;

        // WAL for concurrent readers; FULL so a returned setter survives a crash.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}
