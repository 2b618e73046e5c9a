// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot-log WebSocket stream.
//!
//! A joining client gets the buffered catch-up entries, then live entries,
//! then a terminal `complete`. The sticky completion latch means a client
//! attaching after provisioning finished sees the completion immediately.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::bootlog::BootLogClientEvent;
use crate::error::ApiError;
use crate::handlers::BrowserQuery;
use crate::server::NodeState;

pub async fn bootlog_ws(
    State(state): State<Arc<NodeState>>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    state.auth.check_origin(&headers)?;
    let workspace = query.workspace.clone().ok_or_else(ApiError::workspace_required)?;
    state.auth.workspace(&headers, query.token.as_deref(), Some(&workspace))?;

    Ok(ws.on_upgrade(move |socket| handle_bootlog_socket(state, socket, workspace)))
}

async fn handle_bootlog_socket(state: Arc<NodeState>, socket: WebSocket, workspace: String) {
    let broadcaster = state.bootlog.get_or_create(&workspace);
    let (tx, mut rx) = mpsc::channel::<BootLogClientEvent>(256);
    broadcaster.add_client(tx);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let write_timeout = state.config.ws_write_timeout;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(BootLogClientEvent::Entry(entry)) => {
                    let Ok(text) = serde_json::to_string(&entry) else { continue };
                    let sent = tokio::time::timeout(
                        write_timeout,
                        ws_tx.send(Message::Text(text.into())),
                    )
                    .await;
                    if !matches!(sent, Ok(Ok(()))) {
                        break;
                    }
                }
                Some(BootLogClientEvent::Close) | None => {
                    let _ = ws_tx.close().await;
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
