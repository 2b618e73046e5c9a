// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent (ACP) viewer WebSocket.
//!
//! Attaching creates the session host lazily and replays its message log.
//! A suspended session is transparently resumed before attach; a stopped
//! session is rejected pre-upgrade with 409 and, if it stops between the
//! check and the upgrade, post-upgrade with a policy-violation close.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use sam_core::{AgentSessionStatus, SessionId, WorkspaceId};
use sam_wire::{AgentClientMessage, AgentServerMessage};

use crate::acp::{AcpError, HostSpawnContext};
use crate::auth::WORKSPACE_ID_HEADER;
use crate::error::ApiError;
use crate::handlers::{host_spawn_context, recover_workspace_runtime, BrowserQuery};
use crate::server::NodeState;

pub async fn agent_ws(
    State(state): State<Arc<NodeState>>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    state.auth.check_origin(&headers)?;
    let workspace = query
        .workspace
        .clone()
        .or_else(|| {
            headers
                .get(WORKSPACE_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .ok_or_else(ApiError::workspace_required)?;
    state.auth.workspace(&headers, query.token.as_deref(), Some(&workspace))?;

    let session_id = query
        .session_id
        .clone()
        .ok_or_else(|| ApiError::Validation("missing sessionId".to_string()))?;

    let workspace_id = WorkspaceId::new(&workspace);
    let sid = SessionId::new(&session_id);
    let runtime = recover_workspace_runtime(&state, &workspace_id);

    let session = state.acp.ensure_session_for_attach(
        &workspace_id,
        &sid,
        query.idempotency_key.as_deref(),
        query.worktree.as_deref(),
    )?;

    // Stateful pre-upgrade check.
    match session.status {
        AgentSessionStatus::Stopped => {
            return Err(ApiError::Conflict("session_not_running".to_string()))
        }
        AgentSessionStatus::Suspended => {
            // Transparent auto-resume; a concurrent resume already moved the
            // record to running and that is fine.
            match state.acp.resume(&workspace_id, &sid) {
                Ok(_) => {}
                Err(AcpError::Conflict(message)) => return Err(ApiError::Conflict(message)),
                Err(e) => return Err(e.into()),
            }
        }
        AgentSessionStatus::Running => {}
    }

    let spawn_ctx = host_spawn_context(&state, &runtime).await;
    Ok(ws.on_upgrade(move |socket| {
        handle_agent_socket(state, socket, workspace_id, sid, spawn_ctx)
    }))
}

async fn reject(mut socket: WebSocket, code: &str) {
    let payload = AgentServerMessage::Error { code: code.to_string(), message: None };
    if let Ok(text) = serde_json::to_string(&payload) {
        let _ = socket.send(Message::Text(text.into())).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: code.to_string().into(),
        })))
        .await;
}

async fn handle_agent_socket(
    state: Arc<NodeState>,
    socket: WebSocket,
    workspace_id: WorkspaceId,
    session_id: SessionId,
    spawn_ctx: HostSpawnContext,
) {
    // The session may have been stopped between the pre-upgrade check and
    // the upgrade completing; re-read before touching the host.
    let status = state.acp.get(&workspace_id, &session_id).map(|s| s.status);
    if status != Some(AgentSessionStatus::Running) {
        reject(socket, "session_not_running").await;
        return;
    }

    let host = match state.acp.get_or_create_host(&workspace_id, &session_id, spawn_ctx) {
        Ok(host) => host,
        Err(_) => {
            reject(socket, "session_create_failed").await;
            return;
        }
    };
    if host.wait_ready(state.config.acp.init_timeout).await.is_err() {
        reject(socket, "session_not_running").await;
        return;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<AgentServerMessage>(host.viewer_buffer());
    let viewer_id = match host.attach_viewer(out_tx.clone()) {
        Ok(id) => id,
        Err(_) => {
            reject(socket, "session_not_running").await;
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let write_timeout = state.config.ws_write_timeout;
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            match tokio::time::timeout(write_timeout, ws_tx.send(Message::Text(text.into())))
                .await
            {
                Ok(Ok(())) => {}
                _ => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let parsed: AgentClientMessage = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        match parsed {
            AgentClientMessage::Prompt { text } => {
                if let Err(e) = host.prompt(&text).await {
                    let _ = out_tx
                        .send(AgentServerMessage::Error {
                            code: "prompt_failed".to_string(),
                            message: Some(e.to_string()),
                        })
                        .await;
                }
            }
            AgentClientMessage::Cancel => {
                let _ = host.cancel().await;
            }
            AgentClientMessage::Ping => {
                let _ = out_tx.try_send(AgentServerMessage::Pong);
            }
        }
    }

    host.detach_viewer(viewer_id);
    debug!(workspace_id = %workspace_id, session_id = %session_id, viewer_id,
        "viewer detached");
    drop(out_tx);
    let _ = writer.await;
}
