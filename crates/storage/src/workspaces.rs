// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace metadata rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::{Store, StoreError};

/// Persisted workspace metadata used to rehydrate a runtime after restart.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceMeta {
    pub workspace_id: String,
    pub repository: String,
    pub branch: String,
    pub status: String,
    pub workspace_dir: String,
    pub container_label: String,
    pub container_workdir: String,
    pub container_user: String,
    pub git_user_name: String,
    pub git_user_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceMeta {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            workspace_id: row.get(0)?,
            repository: row.get(1)?,
            branch: row.get(2)?,
            status: row.get(3)?,
            workspace_dir: row.get(4)?,
            container_label: row.get(5)?,
            container_workdir: row.get(6)?,
            container_user: row.get(7)?,
            git_user_name: row.get(8)?,
            git_user_email: row.get(9)?,
            created_at: parse_ts(row, 10)?,
            updated_at: parse_ts(row, 11)?,
        })
    }
}

fn parse_ts(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

const COLUMNS: &str = "workspace_id, repository, branch, status, workspace_dir, \
     container_label, container_workdir, container_user, git_user_name, \
     git_user_email, created_at, updated_at";

impl Store {
    /// Insert or replace a workspace's metadata.
    pub fn upsert_workspace(&self, meta: &WorkspaceMeta) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO workspaces (workspace_id, repository, branch, status, \
             workspace_dir, container_label, container_workdir, container_user, \
             git_user_name, git_user_email, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
             ON CONFLICT(workspace_id) DO UPDATE SET \
             repository = excluded.repository, branch = excluded.branch, \
             status = excluded.status, workspace_dir = excluded.workspace_dir, \
             container_label = excluded.container_label, \
             container_workdir = excluded.container_workdir, \
             container_user = excluded.container_user, \
             git_user_name = excluded.git_user_name, \
             git_user_email = excluded.git_user_email, \
             updated_at = excluded.updated_at",
            params![
                meta.workspace_id,
                meta.repository,
                meta.branch,
                meta.status,
                meta.workspace_dir,
                meta.container_label,
                meta.container_workdir,
                meta.container_user,
                meta.git_user_name,
                meta.git_user_email,
                meta.created_at.to_rfc3339(),
                meta.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one workspace's metadata.
    pub fn get_workspace(&self, workspace_id: &str) -> Result<Option<WorkspaceMeta>, StoreError> {
        let conn = self.conn.lock();
        let query = format!("SELECT {COLUMNS} FROM workspaces WHERE workspace_id = ?1");
        let meta = conn
            .query_row(&query, params![workspace_id], WorkspaceMeta::from_row)
            .optional()?;
        Ok(meta)
    }

    /// List all persisted workspaces.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceMeta>, StoreError> {
        let conn = self.conn.lock();
        let query = format!("SELECT {COLUMNS} FROM workspaces ORDER BY workspace_id");
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map([], WorkspaceMeta::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Delete a workspace's metadata and its tabs.
    pub fn delete_workspace(&self, workspace_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM tabs WHERE workspace_id = ?1", params![workspace_id])?;
        conn.execute(
            "DELETE FROM workspaces WHERE workspace_id = ?1",
            params![workspace_id],
        )?;
        Ok(())
    }
}
