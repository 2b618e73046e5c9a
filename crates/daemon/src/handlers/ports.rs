// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse proxy to a port inside the workspace.
//!
//! Forwards the request to the container's published port on localhost and
//! streams back the upstream status, headers, and body.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use serde::Deserialize;

use crate::error::ApiError;
use crate::handlers::{workspace_read_auth, BrowserQuery};
use crate::server::NodeState;

#[derive(Deserialize)]
pub struct PortPath {
    id: String,
    port: u16,
    #[serde(default)]
    path: Option<String>,
}

pub async fn port_proxy(
    State(state): State<Arc<NodeState>>,
    Path(params): Path<PortPath>,
    Query(query): Query<BrowserQuery>,
    RawQuery(raw_query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    workspace_read_auth(&state, &headers, query.token.as_deref(), &params.id)?;
    state
        .registry
        .get(&params.id)
        .ok_or_else(|| ApiError::NotFound(format!("workspace not found: {}", params.id)))?;

    let path = params.path.unwrap_or_default();
    let mut url = format!("http://127.0.0.1:{}/{}", params.port, path);
    if let Some(raw) = raw_query {
        url.push('?');
        url.push_str(&raw);
    }

    let upstream_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| ApiError::Validation("unsupported method".to_string()))?;
    let mut request = state.proxy_client.request(upstream_method, &url);
    for (name, value) in &headers {
        let name = name.as_str();
        if name == "host" || name == "authorization" || name.starts_with("x-sam-") {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.header(name, value);
        }
    }
    if !body.is_empty() {
        request = request.body(body.to_vec());
    }

    let upstream = request
        .send()
        .await
        .map_err(|e| ApiError::BadGateway(format!("upstream unreachable: {e}")))?;

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        if name == "transfer-encoding" || name == "connection" {
            continue;
        }
        if let Ok(value) = value.to_str() {
            response = response.header(name.as_str(), value);
        }
    }
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::BadGateway(format!("upstream read failed: {e}")))?;
    response
        .body(Body::from(bytes))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
