// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use sam_wire::{HealthResponse, HealthWorkspace};

use crate::server::NodeState;

pub async fn get_health(State(state): State<Arc<NodeState>>) -> Json<HealthResponse> {
    let runtimes = state.registry.list();
    let workspaces: Vec<HealthWorkspace> = runtimes
        .iter()
        .map(|r| HealthWorkspace {
            id: r.workspace_id.as_str().to_string(),
            status: r.status,
            sessions: r.pty.session_count(),
        })
        .collect();
    let sessions = workspaces.iter().map(|w| w.sessions).sum();

    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.config.node_id.clone(),
        active_workspaces: state.registry.active_count(),
        workspaces,
        sessions,
    })
}
