// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All reads and writes are serialized through tokio-rusqlite's single
//! background thread. Do NOT create additional Connection instances for writes:
//! the claim and lease queries rely on that serialization for atomicity.

use std::path::Path;

use pricepulse_core::PulseError;
use tracing::debug;

use crate::migrations;

/// Handle to the single SQLite connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, PulseError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(PulseError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path.to_owned())
            .await
            .map_err(|e| PulseError::storage(e.to_string()))?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema.
    pub async fn open_in_memory() -> Result<Self, PulseError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| PulseError::storage(e.to_string()))?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), PulseError> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;
                     PRAGMA synchronous = NORMAL;",
                )?;
                if wal_mode {
                    let mode: String = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        "WAL",
                        |row| row.get(0),
                    )?;
                    debug!(journal_mode = %mode, "journal mode set");
                }
                Ok(migrations::run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)??;
        Ok(())
    }

    /// Flush the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), PulseError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Convert a tokio-rusqlite error into a storage error.
pub fn map_tr_err(err: tokio_rusqlite::Error<rusqlite::Error>) -> PulseError {
    match err {
        tokio_rusqlite::Error::Error(e) => PulseError::storage(e),
        other => PulseError::storage(other.to_string()),
    }
}
