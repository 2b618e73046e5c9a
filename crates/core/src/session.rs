// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent and terminal session records.
//!
//! An agent session is a logical conversation with an external agent child
//! process; its record outlives the process (suspend keeps the record and
//! the agent-side session id so the conversation can be resumed). A PTY
//! session's record lives inside the PTY manager; only its status enum is
//! shared here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{SessionId, WorkspaceId};

/// Status of an agent (ACP) session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSessionStatus {
    Running,
    Suspended,
    Stopped,
}

crate::simple_display! {
    AgentSessionStatus {
        Running => "running",
        Suspended => "suspended",
        Stopped => "stopped",
    }
}

/// Status of a PTY session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtySessionStatus {
    Running,
    Exited,
}

crate::simple_display! {
    PtySessionStatus {
        Running => "running",
        Exited => "exited",
    }
}

/// Record of one agent session, scoped to a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub workspace_id: WorkspaceId,
    pub session_id: SessionId,
    pub label: String,
    pub status: AgentSessionStatus,
    /// Opaque session id returned by the child agent on first initialize.
    /// Preserved across suspend so a later attach can `LoadSession`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acp_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl AgentSession {
    pub fn new(workspace_id: WorkspaceId, session_id: SessionId, label: String) -> Self {
        let now = Utc::now();
        Self {
            workspace_id,
            session_id,
            label,
            status: AgentSessionStatus::Running,
            acp_session_id: None,
            agent_type: None,
            worktree_path: None,
            created_at: now,
            updated_at: now,
            stopped_at: None,
        }
    }

    /// Touch the updated-at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Kind of a persisted tab (one per PTY or chat session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabKind {
    Terminal,
    Chat,
}

crate::simple_display! {
    TabKind {
        Terminal => "terminal",
        Chat => "chat",
    }
}

impl TabKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "terminal" => Some(Self::Terminal),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

/// Persisted tab row used for cross-device session recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub workspace_id: WorkspaceId,
    pub tab_id: SessionId,
    pub kind: TabKind,
    pub title: String,
    pub sort_order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acp_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
