// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer WebSocket.
//!
//! One socket carries every terminal the user has in a workspace. Sessions
//! survive the socket: a disconnect orphans them, a later socket reattaches
//! and receives the ring-buffer scrollback before any live output.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::SecondsFormat;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use sam_core::{SessionId, UserId, WorkspaceId};
use sam_wire::{TerminalClientMessage, TerminalServerMessage};

use crate::auth::WORKSPACE_ID_HEADER;
use crate::error::ApiError;
use crate::handlers::{recover_workspace_runtime, BrowserQuery};
use crate::pty::{PtyCommand, PtyError, PtyEvent, PtySessionInfo};
use crate::server::NodeState;
use crate::workspace::WorkspaceRuntime;

pub async fn terminal_ws(
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
    let ctx = state.auth.workspace(&headers, query.token.as_deref(), Some(&workspace))?;

    let workspace_id = WorkspaceId::new(workspace);
    let runtime = recover_workspace_runtime(&state, &workspace_id);
    let user_id = ctx.user_id;

    Ok(ws.on_upgrade(move |socket| handle_terminal_socket(state, socket, runtime, user_id)))
}

type WsSink = SplitSink<WebSocket, Message>;

async fn write_loop(
    mut ws_tx: WsSink,
    mut rx: mpsc::Receiver<TerminalServerMessage>,
    write_timeout: std::time::Duration,
) {
    while let Some(msg) = rx.recv().await {
        let Ok(text) = serde_json::to_string(&msg) else { continue };
        match tokio::time::timeout(write_timeout, ws_tx.send(Message::Text(text.into()))).await
        {
            Ok(Ok(())) => {}
            _ => break,
        }
    }
    let _ = ws_tx.close().await;
}

async fn handle_terminal_socket(
    state: Arc<NodeState>,
    socket: WebSocket,
    runtime: WorkspaceRuntime,
    user_id: UserId,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<TerminalServerMessage>(256);
    let writer = tokio::spawn(write_loop(ws_tx, out_rx, state.config.ws_write_timeout));

    let mut attached: Vec<SessionId> = Vec::new();

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let parsed: TerminalClientMessage = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                let _ = out_tx
                    .send(TerminalServerMessage::Error {
                        session_id: None,
                        message: format!("invalid message: {e}"),
                    })
                    .await;
                continue;
            }
        };
        dispatch(&state, &runtime, &user_id, &out_tx, &mut attached, parsed).await;
    }

    // Disconnect orphans; it never terminates the processes.
    runtime.pty.orphan(&attached);
    debug!(workspace_id = %runtime.workspace_id, sessions = attached.len(),
        "terminal socket detached");
    drop(out_tx);
    let _ = writer.await;
}

async fn dispatch(
    state: &Arc<NodeState>,
    runtime: &WorkspaceRuntime,
    user_id: &UserId,
    out_tx: &mpsc::Sender<TerminalServerMessage>,
    attached: &mut Vec<SessionId>,
    msg: TerminalClientMessage,
) {
    match msg {
        TerminalClientMessage::CreateSession { session_id, rows, cols, work_dir } => {
            let sid = SessionId::new(&session_id);
            let cmd = terminal_command(state, runtime, work_dir).await;
            let (sink, sink_rx) = mpsc::channel::<PtyEvent>(256);
            match runtime.pty.create(sid.clone(), user_id.clone(), rows, cols, cmd, sink) {
                Ok(()) => {
                    let _ = out_tx
                        .send(TerminalServerMessage::SessionCreated {
                            session_id: session_id.clone(),
                        })
                        .await;
                    spawn_session_forwarder(session_id.clone(), sink_rx, out_tx.clone());
                    attached.push(sid.clone());
                    persist_terminal_tab(state, runtime, &sid);
                }
                Err(e) => send_pty_error(out_tx, Some(session_id), e).await,
            }
        }

        TerminalClientMessage::ReattachSession { session_id } => {
            let sid = SessionId::new(&session_id);
            let (sink, sink_rx) = mpsc::channel::<PtyEvent>(256);
            match runtime.pty.reattach(&sid, user_id, sink) {
                Ok(scrollback) => {
                    let _ = out_tx
                        .send(TerminalServerMessage::SessionReattached {
                            session_id: session_id.clone(),
                        })
                        .await;
                    let _ = out_tx
                        .send(TerminalServerMessage::Scrollback {
                            session_id: session_id.clone(),
                            data: String::from_utf8_lossy(&scrollback).into_owned(),
                        })
                        .await;
                    // Live bytes buffered since the snapshot flow only after
                    // the scrollback has been queued.
                    spawn_session_forwarder(session_id, sink_rx, out_tx.clone());
                    if !attached.contains(&sid) {
                        attached.push(sid);
                    }
                }
                Err(e) => send_pty_error(out_tx, Some(session_id), e).await,
            }
        }

        TerminalClientMessage::Input { session_id, data } => {
            let sid = SessionId::new(&session_id);
            if let Err(e) = runtime.pty.write(&sid, user_id, data.as_bytes()) {
                send_pty_error(out_tx, Some(session_id), e).await;
            }
        }

        TerminalClientMessage::Resize { session_id, rows, cols } => {
            let sid = SessionId::new(&session_id);
            if let Err(e) = runtime.pty.resize(&sid, user_id, rows, cols) {
                send_pty_error(out_tx, Some(session_id), e).await;
            }
        }

        TerminalClientMessage::CloseSession { session_id } => {
            let sid = SessionId::new(&session_id);
            match runtime.pty.close(&sid, user_id) {
                Ok(()) => {
                    attached.retain(|s| s != &sid);
                    remove_terminal_tab(state, runtime, &sid);
                    let _ = out_tx
                        .send(TerminalServerMessage::SessionClosed {
                            session_id,
                            reason: "closed".to_string(),
                        })
                        .await;
                }
                Err(e) => send_pty_error(out_tx, Some(session_id), e).await,
            }
        }

        TerminalClientMessage::RenameSession { session_id, name } => {
            let sid = SessionId::new(&session_id);
            match runtime.pty.set_name(&sid, user_id, &name) {
                Ok(()) => {
                    persist_terminal_tab(state, runtime, &sid);
                    let _ = out_tx
                        .send(TerminalServerMessage::SessionRenamed { session_id, name })
                        .await;
                }
                Err(e) => send_pty_error(out_tx, Some(session_id), e).await,
            }
        }

        TerminalClientMessage::ListSessions => {
            let sessions = runtime
                .pty
                .active_sessions_for_user(user_id)
                .into_iter()
                .map(session_info)
                .collect();
            let _ = out_tx.send(TerminalServerMessage::SessionList { sessions }).await;
        }

        // Pong without recording activity.
        TerminalClientMessage::Ping => {
            let _ = out_tx.send(TerminalServerMessage::Pong).await;
        }
    }
}

/// Forward PTY events into the socket channel. Spawned only after any
/// scrollback has been queued, so replay and live output cannot interleave.
fn spawn_session_forwarder(
    session_id: String,
    mut rx: mpsc::Receiver<PtyEvent>,
    out_tx: mpsc::Sender<TerminalServerMessage>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let msg = match event {
                PtyEvent::Output(bytes) => TerminalServerMessage::Output {
                    session_id: session_id.clone(),
                    data: String::from_utf8_lossy(&bytes).into_owned(),
                },
                PtyEvent::Closed { reason } => TerminalServerMessage::SessionClosed {
                    session_id: session_id.clone(),
                    reason,
                },
            };
            if out_tx.send(msg).await.is_err() {
                break;
            }
        }
    });
}

async fn send_pty_error(
    out_tx: &mpsc::Sender<TerminalServerMessage>,
    session_id: Option<String>,
    e: PtyError,
) {
    let _ = out_tx
        .send(TerminalServerMessage::Error { session_id, message: e.to_string() })
        .await;
}

fn session_info(info: PtySessionInfo) -> sam_wire::TerminalSessionInfo {
    sam_wire::TerminalSessionInfo {
        session_id: info.session_id.as_str().to_string(),
        name: info.name,
        status: info.status.to_string(),
        created_at: info.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        last_activity: info.last_activity.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Resolve what to exec: the devcontainer when container mode is on and the
/// container resolves, else a host shell rooted at the workspace directory.
async fn terminal_command(
    state: &Arc<NodeState>,
    runtime: &WorkspaceRuntime,
    work_dir: Option<String>,
) -> PtyCommand {
    if state.config.container_mode {
        if let Ok(container) = state.containers.resolve(&runtime.container_label).await {
            let workdir = work_dir
                .clone()
                .unwrap_or_else(|| runtime.container_workdir.clone());
            let mut args = vec!["exec".to_string(), "-it".to_string()];
            args.push("-w".to_string());
            args.push(workdir);
            let user = if container.user.is_empty() {
                runtime.container_user.clone()
            } else {
                container.user
            };
            if !user.is_empty() {
                args.push("-u".to_string());
                args.push(user);
            }
            args.push(container.container_id);
            args.push("/bin/bash".to_string());
            args.push("-l".to_string());
            return PtyCommand {
                program: "docker".to_string(),
                args,
                cwd: None,
                env: Vec::new(),
            };
        }
    }
    // Host shell: prefer the requested dir, then the workspace dir, but only
    // if it exists (a recovering workspace may not have one yet).
    let cwd = work_dir
        .or_else(|| Some(runtime.workspace_dir.clone()))
        .filter(|dir| std::path::Path::new(dir).is_dir());
    PtyCommand::shell(cwd)
}

fn persist_terminal_tab(state: &Arc<NodeState>, runtime: &WorkspaceRuntime, sid: &SessionId) {
    let Some(info) = runtime.pty.get(sid) else { return };
    let tab = sam_core::TabRecord {
        workspace_id: runtime.workspace_id.clone(),
        tab_id: sid.clone(),
        kind: sam_core::TabKind::Terminal,
        title: info.name,
        sort_order: runtime.pty.session_count() as i64,
        acp_session_id: None,
        agent_id: None,
        created_at: info.created_at,
    };
    if let Err(e) = state.store.upsert_tab(&tab) {
        tracing::warn!(workspace_id = %runtime.workspace_id, error = %e, "tab persist failed");
    }
}

fn remove_terminal_tab(state: &Arc<NodeState>, runtime: &WorkspaceRuntime, sid: &SessionId) {
    if let Err(e) = state.store.delete_tab(runtime.workspace_id.as_str(), sid.as_str()) {
        tracing::warn!(workspace_id = %runtime.workspace_id, error = %e, "tab removal failed");
    }
}
