// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session management endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use sam_core::{SessionId, WorkspaceId};
use sam_wire::{
    AgentSessionView, CreateAgentSessionRequest, StartAgentSessionRequest,
};

use crate::acp::AcpError;
use crate::error::ApiError;
use crate::handlers::{host_spawn_context, workspace_read_auth, BrowserQuery};
use crate::server::NodeState;

impl From<AcpError> for ApiError {
    fn from(e: AcpError) -> Self {
        match e {
            AcpError::NotFound => ApiError::NotFound("session not found".to_string()),
            AcpError::Conflict(message) => ApiError::Conflict(message),
            AcpError::Internal(message) => ApiError::Internal(message),
        }
    }
}

fn view(state: &NodeState, session: sam_core::AgentSession) -> AgentSessionView {
    let host = state.acp.host_view(&session.workspace_id, &session.session_id);
    let (host_status, viewer_count) = match host {
        Some((status, viewers)) => (Some(status), Some(viewers)),
        None => (None, None),
    };
    AgentSessionView { session, host_status, viewer_count }
}

pub async fn create_agent_session(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateAgentSessionRequest>,
) -> Result<(StatusCode, Json<AgentSessionView>), ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    if req.session_id.is_empty() {
        return Err(ApiError::Validation("missing sessionId".to_string()));
    }
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let ws = WorkspaceId::new(&workspace_id);
    let sid = SessionId::new(&req.session_id);
    let (session, created) = state.acp.create_session(
        &ws,
        &sid,
        &req.label,
        req.agent_type.as_deref(),
        idempotency_key,
    )?;

    let code = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((code, Json(view(&state, session))))
}

pub async fn list_agent_sessions(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    workspace_read_auth(&state, &headers, query.token.as_deref(), &workspace_id)?;
    let ws = WorkspaceId::new(&workspace_id);
    let sessions: Vec<AgentSessionView> =
        state.acp.list(&ws).into_iter().map(|s| view(&state, s)).collect();
    Ok(Json(serde_json::json!({"sessions": sessions})))
}

pub async fn stop_agent_session(
    State(state): State<Arc<NodeState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<AgentSessionView>, ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    let session = state
        .acp
        .stop(&WorkspaceId::new(&workspace_id), &SessionId::new(&session_id))
        .await?;
    Ok(Json(view(&state, session)))
}

pub async fn suspend_agent_session(
    State(state): State<Arc<NodeState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<AgentSessionView>, ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    let session = state
        .acp
        .suspend(&WorkspaceId::new(&workspace_id), &SessionId::new(&session_id))
        .await?;
    Ok(Json(view(&state, session)))
}

pub async fn resume_agent_session(
    State(state): State<Arc<NodeState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<AgentSessionView>, ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    let session =
        state.acp.resume(&WorkspaceId::new(&workspace_id), &SessionId::new(&session_id))?;
    Ok(Json(view(&state, session)))
}

/// Start the agent process (if needed) and submit an initial prompt. A
/// start while a prompt is already in flight is a logged no-op success.
pub async fn start_agent_session(
    State(state): State<Arc<NodeState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<StartAgentSessionRequest>,
) -> Result<(StatusCode, Json<AgentSessionView>), ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    let ws = WorkspaceId::new(&workspace_id);
    let sid = SessionId::new(&session_id);

    let session = state.acp.get(&ws, &sid).ok_or(AcpError::NotFound)?;
    if session.status != sam_core::AgentSessionStatus::Running {
        return Err(ApiError::Conflict("session_not_running".to_string()));
    }

    let runtime = state
        .registry
        .get(&workspace_id)
        .ok_or_else(|| ApiError::NotFound(format!("workspace not found: {workspace_id}")))?;
    let ctx = host_spawn_context(&state, &runtime).await;
    let host = state.acp.get_or_create_host(&ws, &sid, ctx)?;
    host.wait_ready(state.config.acp.init_timeout)
        .await
        .map_err(|_| ApiError::Conflict("session_not_running".to_string()))?;

    if let Some(prompt) = req.initial_prompt.as_deref().filter(|p| !p.is_empty()) {
        host.prompt(prompt)
            .await
            .map_err(|e| ApiError::Conflict(e.to_string()))?;
    }

    let session = state.acp.get(&ws, &sid).ok_or(AcpError::NotFound)?;
    Ok((StatusCode::ACCEPTED, Json(view(&state, session))))
}
