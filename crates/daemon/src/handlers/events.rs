// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event ring reads. Newest first, `?limit=` clamped, no pagination.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;

use sam_wire::EventsResponse;

use crate::error::ApiError;
use crate::events::clamp_limit;
use crate::handlers::{workspace_read_auth, BrowserQuery};
use crate::server::NodeState;

pub async fn node_events(
    State(state): State<Arc<NodeState>>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
) -> Result<Json<EventsResponse>, ApiError> {
    state.auth.node_event(&headers, query.token.as_deref())?;
    let events = state.events.node_events(clamp_limit(query.limit));
    Ok(Json(EventsResponse { events, next_cursor: None }))
}

pub async fn workspace_events(
    State(state): State<Arc<NodeState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<BrowserQuery>,
    headers: HeaderMap,
) -> Result<Json<EventsResponse>, ApiError> {
    workspace_read_auth(&state, &headers, query.token.as_deref(), &workspace_id)?;
    let events = state.events.workspace_events(&workspace_id, clamp_limit(query.limit));
    Ok(Json(EventsResponse { events, next_cursor: None }))
}
