use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::dedup::MarkerStore;
use crate::error::Error;
use crate::symbols::SymbolKey;

/// Markers in an embedded SQLite table.
pub struct SqliteMarkerStore {
    conn: Mutex<Connection>,
}

impl SqliteMarkerStore {
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite marker schema initialized (version 1)");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|e| Error::Other(format!("Failed to lock marker database: {}", e)))
    }

    pub fn count(&self) -> Result<usize, Error> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM symbol_marker", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl MarkerStore for SqliteMarkerStore {
    fn contains(&self, key: &SymbolKey) -> Result<bool, Error> {
        let found = self
            .lock()?
            .query_row(
                "SELECT 1 FROM symbol_marker WHERE debug_file = ?1 AND debug_id = ?2",
                params![key.debug_file, key.debug_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark(&self, key: &SymbolKey) -> Result<(), Error> {
        self.lock()?.execute(
            "INSERT OR IGNORE INTO symbol_marker (debug_file, debug_id) VALUES (?1, ?2)",
            params![key.debug_file, key.debug_id],
        )?;
        Ok(())
    }
}
