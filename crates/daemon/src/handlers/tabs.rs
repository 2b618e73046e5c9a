// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-device tab listing.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;

use sam_wire::TabsResponse;

use crate::error::ApiError;
use crate::handlers::{workspace_read_auth, BrowserQuery};
use crate::server::NodeState;

pub async fn list_tabs(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
) -> Result<Json<TabsResponse>, ApiError> {
    workspace_read_auth(&state, &headers, query.token.as_deref(), &workspace_id)?;
    let tabs = state.store.list_tabs(&workspace_id)?;
    Ok(Json(TabsResponse { tabs }))
}
