// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP request and response bodies for the management and browser surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sam_core::{AgentSession, EventRecord, TabRecord, WorkspaceStatus};

/// `POST /workspaces` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    pub workspace_id: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_user_email: Option<String>,
}

/// `POST /workspaces` 202 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceResponse {
    pub workspace_id: String,
    pub status: WorkspaceStatus,
}

/// One workspace in list and detail responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    pub workspace_id: String,
    pub repository: String,
    pub branch: String,
    pub status: WorkspaceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `GET /workspaces` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceListResponse {
    pub workspaces: Vec<WorkspaceSummary>,
}

/// `POST /workspaces/{id}/stop|restart|rebuild` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: WorkspaceStatus,
}

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub active_workspaces: usize,
    pub workspaces: Vec<HealthWorkspace>,
    /// Total live PTY sessions across workspaces.
    pub sessions: usize,
}

/// Per-workspace line in the health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthWorkspace {
    pub id: String,
    pub status: WorkspaceStatus,
    pub sessions: usize,
}

/// `POST /workspaces/{id}/agent-sessions` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentSessionRequest {
    pub session_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
}

/// `POST /workspaces/{id}/agent-sessions/{sessionId}/start` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAgentSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
}

/// Agent session enriched with live host state when a host exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSessionView {
    #[serde(flatten)]
    pub session: AgentSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_count: Option<usize>,
}

/// `GET /workspaces/{id}/tabs` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabsResponse {
    pub tabs: Vec<TabRecord>,
}

/// `GET /events` and `GET /workspaces/{id}/events` response.
///
/// `next_cursor` is always null; pagination is intentionally not provided.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
    pub next_cursor: Option<String>,
}
