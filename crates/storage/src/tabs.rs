// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tab rows: one per PTY or chat session, ordered for the tab bar.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use sam_core::{SessionId, TabKind, TabRecord, WorkspaceId};

use crate::{Store, StoreError};

fn tab_from_row(row: &Row<'_>) -> Result<TabRecord, rusqlite::Error> {
    let kind_raw: String = row.get(2)?;
    let kind = TabKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown tab kind: {kind_raw}").into(),
        )
    })?;
    let created_raw: String = row.get(7)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
    Ok(TabRecord {
        workspace_id: WorkspaceId::new(row.get::<_, String>(0)?),
        tab_id: SessionId::new(row.get::<_, String>(1)?),
        kind,
        title: row.get(3)?,
        sort_order: row.get(4)?,
        acp_session_id: row.get(5)?,
        agent_id: row.get(6)?,
        created_at,
    })
}

impl Store {
    /// Insert or replace a tab row.
    pub fn upsert_tab(&self, tab: &TabRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tabs (workspace_id, tab_id, kind, title, sort_order, \
             acp_session_id, agent_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(workspace_id, tab_id) DO UPDATE SET \
             kind = excluded.kind, title = excluded.title, \
             sort_order = excluded.sort_order, \
             acp_session_id = excluded.acp_session_id, \
             agent_id = excluded.agent_id",
            params![
                tab.workspace_id.as_str(),
                tab.tab_id.as_str(),
                tab.kind.to_string(),
                tab.title,
                tab.sort_order,
                tab.acp_session_id,
                tab.agent_id,
                tab.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List a workspace's tabs ordered by sort order.
    pub fn list_tabs(&self, workspace_id: &str) -> Result<Vec<TabRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT workspace_id, tab_id, kind, title, sort_order, acp_session_id, \
             agent_id, created_at FROM tabs WHERE workspace_id = ?1 \
             ORDER BY sort_order, tab_id",
        )?;
        let rows = stmt.query_map(params![workspace_id], tab_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Fetch one tab.
    pub fn get_tab(
        &self,
        workspace_id: &str,
        tab_id: &str,
    ) -> Result<Option<TabRecord>, StoreError> {
        use rusqlite::OptionalExtension;
        let conn = self.conn.lock();
        let tab = conn
            .query_row(
                "SELECT workspace_id, tab_id, kind, title, sort_order, acp_session_id, \
                 agent_id, created_at FROM tabs \
                 WHERE workspace_id = ?1 AND tab_id = ?2",
                params![workspace_id, tab_id],
                tab_from_row,
            )
            .optional()?;
        Ok(tab)
    }

    /// Delete one tab.
    pub fn delete_tab(&self, workspace_id: &str, tab_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM tabs WHERE workspace_id = ?1 AND tab_id = ?2",
            params![workspace_id, tab_id],
        )?;
        Ok(())
    }

    /// Record the agent-side session id on a chat tab so a suspended
    /// conversation can be resumed after restart.
    pub fn set_tab_acp_session(
        &self,
        workspace_id: &str,
        tab_id: &str,
        acp_session_id: Option<&str>,
        agent_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE tabs SET acp_session_id = ?3, agent_id = ?4 \
             WHERE workspace_id = ?1 AND tab_id = ?2",
            params![workspace_id, tab_id, acp_session_id, agent_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tabs_tests.rs"]
mod tests;
