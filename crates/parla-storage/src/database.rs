// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use parla_core::ParlaError;
use tracing::debug;

use crate::migrations;

/// Per-connection PRAGMAs. `journal_mode` is persisted in the file and set separately.
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;
     PRAGMA busy_timeout = 5000;
     PRAGMA synchronous = NORMAL;";

/// Convert a tokio-rusqlite error into the storage error kind.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ParlaError {
    ParlaError::Storage {
        source: Box::new(e),
    }
}

fn map_sqlite_err(e: rusqlite::Error) -> ParlaError {
    ParlaError::Storage {
        source: Box::new(e),
    }
}

/// The single writer for a Parla database file.
///
/// Query modules accept `&Database` and run their SQL inside
/// `database.connection().call(..)`, which tokio-rusqlite executes in order on
/// one background thread. This is what makes the conditional terminal writes
/// and read-then-append transactions race-free within a process.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and migrate it.
    pub async fn open(path: &str) -> Result<Self, ParlaError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, ParlaError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ParlaError::Storage {
                source: Box::new(e),
            })?;
        }

        // Schema work happens on a short-lived blocking connection so refinery
        // gets the `&mut rusqlite::Connection` it needs.
        let owned = path.to_string();
        tokio::task::spawn_blocking(move || prepare_schema(&owned, wal_mode))
            .await
            .map_err(|e| ParlaError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| ParlaError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| conn.execute_batch(CONNECTION_PRAGMAS))
            .await
            .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared connection handle.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL into the main file.
    pub async fn checkpoint(&self) -> Result<(), ParlaError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), ParlaError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(|e| ParlaError::Storage {
            source: Box::new(e),
        })
    }
}

fn prepare_schema(path: &str, wal_mode: bool) -> Result<(), ParlaError> {
    let mut conn = rusqlite::Connection::open(path).map_err(map_sqlite_err)?;
    let journal_mode = if wal_mode { "WAL" } else { "DELETE" };
    conn.pragma_update(None, "journal_mode", journal_mode)
        .map_err(map_sqlite_err)?;
    conn.execute_batch(CONNECTION_PRAGMAS)
        .map_err(map_sqlite_err)?;
    migrations::run_migrations(&mut conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("parla.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();

        for table in [
            "chat_jobs",
            "conversation_messages",
            "conversations",
            "queue",
            "sentence_audio",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing {table}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let path = path.to_str().unwrap();

        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();

        let mode: String = db
            .connection()
            .call(|conn| conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("fk.db").to_str().unwrap())
            .await
            .unwrap();

        let result = db
            .connection()
            .call(|conn| {
                conn.execute(
                    "INSERT INTO conversation_messages (conversation_id, position, role, content)
                     VALUES ('missing', 0, 'user', 'hi')",
                    [],
                )
            })
            .await;
        assert!(result.is_err());
        db.close().await.unwrap();
    }
}
