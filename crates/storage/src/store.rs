// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handle and schema migration.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid row: {0}")]
    InvalidRow(String),
}

/// Handle to the daemon's SQLite database.
///
/// The connection is serialized behind a mutex; every operation is a short
/// synchronous statement, never held across I/O elsewhere.
#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS workspaces (
    workspace_id       TEXT PRIMARY KEY,
    repository         TEXT NOT NULL DEFAULT '',
    branch             TEXT NOT NULL DEFAULT '',
    status             TEXT NOT NULL DEFAULT 'creating',
    workspace_dir      TEXT NOT NULL DEFAULT '',
    container_label    TEXT NOT NULL DEFAULT '',
    container_workdir  TEXT NOT NULL DEFAULT '',
    container_user     TEXT NOT NULL DEFAULT '',
    git_user_name      TEXT NOT NULL DEFAULT '',
    git_user_email     TEXT NOT NULL DEFAULT '',
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tabs (
    workspace_id    TEXT NOT NULL,
    tab_id          TEXT NOT NULL,
    kind            TEXT NOT NULL,
    title           TEXT NOT NULL DEFAULT '',
    sort_order      INTEGER NOT NULL DEFAULT 0,
    acp_session_id  TEXT,
    agent_id        TEXT,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (workspace_id, tab_id)
);
";

impl Store {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Checkpoint and close. Safe to call once at shutdown; subsequent
    /// operations on clones will fail.
    pub fn close(&self) {
        let conn = self.conn.lock();
        if let Err(e) = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE") {
            tracing::warn!(error = %e, "wal checkpoint on close failed");
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
