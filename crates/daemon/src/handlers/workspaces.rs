// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lifecycle endpoints.
//!
//! Every status change goes through the registry CAS with the expected set
//! of the triggering verb; a lost CAS surfaces as 409 `invalid_transition`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::warn;

use sam_core::{EventLevel, WorkspaceId, WorkspaceStatus, REBUILD_SOURCES, RESTART_SOURCES, STOP_SOURCES};
use sam_wire::{
    CreateWorkspaceRequest, CreateWorkspaceResponse, StatusResponse, WorkspaceListResponse,
    WorkspaceSummary,
};

use crate::error::ApiError;
use crate::handlers::{workspace_read_auth, BrowserQuery};
use crate::server::NodeState;
use crate::workspace::{
    start_workspace_provision, ProvisionLabels, RegistryError, WorkspaceRuntime,
};

fn summary(runtime: &WorkspaceRuntime) -> WorkspaceSummary {
    WorkspaceSummary {
        workspace_id: runtime.workspace_id.as_str().to_string(),
        repository: runtime.repository.clone(),
        branch: runtime.branch.clone(),
        status: runtime.status,
        created_at: runtime.created_at,
        updated_at: runtime.updated_at,
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => ApiError::NotFound(format!("workspace not found: {id}")),
            RegistryError::InvalidTransition { .. } => ApiError::invalid_transition(),
        }
    }
}

pub async fn create_workspace(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<CreateWorkspaceResponse>), ApiError> {
    state.auth.management(&headers, Some(&req.workspace_id))?;
    if req.workspace_id.is_empty() {
        return Err(ApiError::Validation("missing workspaceId".to_string()));
    }
    let workspace_id = WorkspaceId::new(&req.workspace_id);

    let runtime = match state.registry.get(workspace_id.as_str()) {
        Some(existing) => match existing.status {
            // Already provisioning: idempotent accept.
            WorkspaceStatus::Creating => existing,
            WorkspaceStatus::Running | WorkspaceStatus::Recovery => {
                return Err(ApiError::Conflict("workspace already exists".to_string()))
            }
            WorkspaceStatus::Stopped | WorkspaceStatus::Error => {
                state.registry.upsert(
                    &workspace_id,
                    &req.repository,
                    &req.branch,
                    existing.status,
                    req.callback_token.clone(),
                );
                let updated = state.registry.cas(
                    workspace_id.as_str(),
                    RESTART_SOURCES,
                    WorkspaceStatus::Creating,
                )?;
                let _ = start_workspace_provision(
                    state.provision_deps(),
                    updated.clone(),
                    ProvisionLabels::create(),
                );
                updated
            }
        },
        None => {
            let runtime = state.registry.upsert(
                &workspace_id,
                &req.repository,
                &req.branch,
                WorkspaceStatus::Creating,
                req.callback_token.clone(),
            );
            let _ = start_workspace_provision(
                state.provision_deps(),
                runtime.clone(),
                ProvisionLabels::create(),
            );
            runtime
        }
    };

    state.registry.set_git_identity(
        workspace_id.as_str(),
        req.git_user_name.as_deref(),
        req.git_user_email.as_deref(),
    );
    state.events.append_node_event(
        Some(workspace_id.as_str()),
        EventLevel::Info,
        "workspace.create_requested",
        "workspace creation requested",
        serde_json::json!({"repository": req.repository, "branch": req.branch}),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateWorkspaceResponse {
            workspace_id: runtime.workspace_id.as_str().to_string(),
            status: WorkspaceStatus::Creating,
        }),
    ))
}

pub async fn list_workspaces(
    State(state): State<Arc<NodeState>>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
) -> Result<Json<WorkspaceListResponse>, ApiError> {
    state.auth.node_event(&headers, query.token.as_deref())?;
    let workspaces = state.registry.list().iter().map(summary).collect();
    Ok(Json(WorkspaceListResponse { workspaces }))
}

pub async fn get_workspace(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
) -> Result<Json<WorkspaceSummary>, ApiError> {
    workspace_read_auth(&state, &headers, query.token.as_deref(), &workspace_id)?;
    let runtime = state
        .registry
        .get(&workspace_id)
        .ok_or_else(|| ApiError::NotFound(format!("workspace not found: {workspace_id}")))?;
    Ok(Json(summary(&runtime)))
}

pub async fn stop_workspace(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    let runtime =
        state.registry.cas(&workspace_id, STOP_SOURCES, WorkspaceStatus::Stopped)?;

    // Workspace shutdown is one of the three legal PTY closure triggers.
    runtime.pty.close_all();
    state.events.append_node_event(
        Some(&workspace_id),
        EventLevel::Info,
        "workspace.stopped",
        "workspace stopped",
        serde_json::Value::Null,
    );
    Ok(Json(StatusResponse { status: runtime.status }))
}

pub async fn restart_workspace(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    let runtime =
        state.registry.cas(&workspace_id, RESTART_SOURCES, WorkspaceStatus::Creating)?;
    let _ = start_workspace_provision(state.provision_deps(), runtime.clone(), ProvisionLabels::restart());
    Ok((StatusCode::ACCEPTED, Json(StatusResponse { status: runtime.status })))
}

pub async fn rebuild_workspace(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    let runtime =
        state.registry.cas(&workspace_id, REBUILD_SOURCES, WorkspaceStatus::Creating)?;
    let _ = start_workspace_provision(state.provision_deps(), runtime.clone(), ProvisionLabels::rebuild());
    Ok((StatusCode::ACCEPTED, Json(StatusResponse { status: runtime.status })))
}

pub async fn delete_workspace(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.management(&headers, Some(&workspace_id))?;
    let ws = WorkspaceId::new(&workspace_id);

    let runtime = state
        .registry
        .remove(&workspace_id)
        .ok_or_else(|| ApiError::NotFound(format!("workspace not found: {workspace_id}")))?;

    runtime.pty.close_all();
    state.acp.remove_workspace(&ws).await;
    if let Err(e) = state.provisioner.remove_volume(&workspace_id).await {
        warn!(workspace_id, error = %e, "volume removal failed");
    }
    if let Err(e) = state.store.delete_workspace(&workspace_id) {
        warn!(workspace_id, error = %e, "metadata removal failed");
    }
    state.bootlog.remove(&workspace_id);
    state.events.append_node_event(
        Some(&workspace_id),
        EventLevel::Info,
        "workspace.deleted",
        "workspace deleted",
        serde_json::Value::Null,
    );
    state.events.remove_workspace(&workspace_id);

    Ok(Json(serde_json::json!({"success": true})))
}
