// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All reads and writes are serialized through tokio-rusqlite's single
//! background thread, and every query function runs inside one `call`, so a
//! multi-statement write is one SQLite transaction and a dropped future can
//! never leave it half applied.

use std::path::Path;
use std::time::Duration;

use lorikeet_config::model::StorageConfig;
use lorikeet_core::LorikeetError;
use thiserror::Error;
use tracing::debug;

/// Error type returned from inside `Connection::call` closures.
///
/// `Rejected` carries a domain error decided inside a transaction (duplicate
/// key, replayed nonce, address conflict) so it reaches the caller unchanged.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Rejected(#[from] LorikeetError),
}

/// Map a tokio-rusqlite failure to the domain error, keeping rejections intact.
pub fn map_tr_err(err: tokio_rusqlite::Error<QueryError>) -> LorikeetError {
    match err {
        tokio_rusqlite::Error::Error(QueryError::Rejected(e)) => e,
        tokio_rusqlite::Error::Error(QueryError::Sqlite(e)) => LorikeetError::storage(e),
        other => LorikeetError::storage(other.to_string()),
    }
}

/// Handle to the SQLite database. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if necessary) the database with WAL enabled and apply migrations.
    pub async fn open(path: &str) -> Result<Self, LorikeetError> {
        Self::open_with_config(&StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        })
        .await
    }

    /// Open the database described by `config` and apply migrations.
    pub async fn open_with_config(config: &StorageConfig) -> Result<Self, LorikeetError> {
        let path = config.database_path.as_str();
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(LorikeetError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(LorikeetError::storage)?;

        let wal_mode = config.wal_mode;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        conn.call(move |conn| -> Result<(), QueryError> {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;
            if wal_mode {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            }
            crate::migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared connection. All queries go through `call` on it.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), LorikeetError> {
        self.conn
            .call(|conn| -> Result<(), QueryError> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(LorikeetError::storage)
    }
}
