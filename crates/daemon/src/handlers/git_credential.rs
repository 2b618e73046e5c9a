// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git credential helper endpoint.
//!
//! Called by the in-workspace `git credential` helper, authenticated with
//! the workspace's callback token. Emits credential-helper lines.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::handlers::BrowserQuery;
use crate::server::NodeState;

pub async fn git_credential(
    State(state): State<Arc<NodeState>>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
) -> Result<String, ApiError> {
    let workspace_id = query.workspace.clone().ok_or_else(ApiError::workspace_required)?;
    let runtime = state
        .registry
        .get(&workspace_id)
        .ok_or_else(|| ApiError::NotFound(format!("workspace not found: {workspace_id}")))?;

    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing callback token".to_string()))?;
    match &runtime.callback_token {
        Some(expected) if expected == bearer => {}
        _ => return Err(ApiError::Unauthorized("invalid callback token".to_string())),
    }

    let token = state
        .control
        .fetch_git_token(&workspace_id, runtime.callback_token.as_deref())
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("no git token for workspace".to_string()))?;

    Ok(format!(
        "protocol=https\nhost=github.com\nusername=x-access-token\npassword={token}\n\n"
    ))
}
