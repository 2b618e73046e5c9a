// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket handlers.

pub mod agent_sessions;
pub mod agent_ws;
pub mod bootlog_ws;
pub mod events;
pub mod git_credential;
pub mod health;
pub mod ports;
pub mod tabs;
pub mod terminal_ws;
pub mod workspaces;

use std::sync::Arc;

use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::info;

use sam_core::{WorkspaceId, WorkspaceStatus};

use crate::acp::HostSpawnContext;
use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::server::NodeState;
use crate::workspace::{start_workspace_provision, ProvisionLabels, WorkspaceRuntime};

/// Common query parameters for browser-facing endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct BrowserQuery {
    pub token: Option<String>,
    pub workspace: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: Option<String>,
    pub worktree: Option<String>,
    pub limit: Option<usize>,
}

/// Browser reads accept either family: a management bearer, or workspace
/// cookie/token credentials.
pub(crate) fn workspace_read_auth(
    state: &NodeState,
    headers: &HeaderMap,
    query_token: Option<&str>,
    workspace_id: &str,
) -> Result<AuthContext, ApiError> {
    match state.auth.management(headers, Some(workspace_id)) {
        Ok(ctx) => Ok(ctx),
        Err(ApiError::Forbidden(message)) => Err(ApiError::Forbidden(message)),
        Err(_) => state.auth.workspace(headers, query_token, Some(workspace_id)),
    }
}

/// Auto-recovery used by WebSocket attach paths: make sure a runtime exists
/// and is (re)provisioning when it was stopped, errored, or unknown.
pub(crate) fn recover_workspace_runtime(
    state: &Arc<NodeState>,
    workspace_id: &WorkspaceId,
) -> WorkspaceRuntime {
    match state.registry.get(workspace_id.as_str()) {
        Some(runtime)
            if matches!(
                runtime.status,
                WorkspaceStatus::Running
                    | WorkspaceStatus::Recovery
                    | WorkspaceStatus::Creating
            ) =>
        {
            runtime
        }
        Some(runtime) => {
            match state.registry.cas(
                workspace_id.as_str(),
                &[WorkspaceStatus::Stopped, WorkspaceStatus::Error],
                WorkspaceStatus::Creating,
            ) {
                Ok(updated) => {
                    info!(workspace_id = %workspace_id, "auto-recovering workspace");
                    let _ = start_workspace_provision(
                        state.provision_deps(),
                        updated.clone(),
                        ProvisionLabels::recover(),
                    );
                    updated
                }
                // A concurrent recovery won the CAS; use the fresh state.
                Err(_) => state.registry.get(workspace_id.as_str()).unwrap_or(runtime),
            }
        }
        None => {
            info!(workspace_id = %workspace_id, "hydrating workspace on first attach");
            let runtime = state.registry.upsert(
                workspace_id,
                "",
                "",
                WorkspaceStatus::Creating,
                None,
            );
            let _ = start_workspace_provision(
                state.provision_deps(),
                runtime.clone(),
                ProvisionLabels::recover(),
            );
            runtime
        }
    }
}

/// Resolve the exec target for an agent host. A container that resolves as
/// unavailable triggers in-place workspace recovery; the host then starts
/// against the host fallback while the container re-provisions.
pub(crate) async fn host_spawn_context(
    state: &Arc<NodeState>,
    runtime: &WorkspaceRuntime,
) -> HostSpawnContext {
    if !state.config.container_mode {
        return HostSpawnContext { workdir: runtime.workspace_dir.clone(), container: None };
    }
    match state.containers.resolve(&runtime.container_label).await {
        Ok(mut container) => {
            if container.workdir.is_empty() {
                container.workdir = runtime.container_workdir.clone();
            }
            if container.user.is_empty() {
                container.user = runtime.container_user.clone();
            }
            HostSpawnContext {
                workdir: runtime.container_workdir.clone(),
                container: Some(container),
            }
        }
        Err(e) if e.is_unavailable() => {
            info!(workspace_id = %runtime.workspace_id, error = %e,
                "container unavailable, recovering workspace");
            recover_workspace_runtime(state, &runtime.workspace_id);
            HostSpawnContext { workdir: runtime.workspace_dir.clone(), container: None }
        }
        Err(e) => {
            info!(workspace_id = %runtime.workspace_id, error = %e,
                "container lookup failed, using host fallback");
            HostSpawnContext { workdir: runtime.workspace_dir.clone(), container: None }
        }
    }
}
