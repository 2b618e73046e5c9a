// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication and route gate.
//!
//! Three credential families, each for its own operation class:
//!
//! - node management: `Authorization: Bearer <JWT>` against the management
//!   validator; used by control-plane mutations.
//! - workspace request: workspace session cookie or `?token=<JWT>` query;
//!   used by browser HTTP and WebSocket traffic to workspace endpoints.
//! - node event: management bearer OR management query token OR a valid
//!   workspace cookie; used by browser-facing read-only node endpoints.
//!
//! Every gate also enforces the route headers `X-SAM-Node-Id` and
//! `X-SAM-Workspace-Id` when present, and rejects a workspace-claimed JWT
//! whose claim disagrees with the routed workspace.

mod origin;
mod token;

pub use origin::origin_allowed;
pub use token::{AuthError, Claims, JwtValidator, TokenValidator};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use parking_lot::Mutex;

use sam_core::{Clock, SystemClock, UserId};

use crate::error::ApiError;

/// Route header naming the target node.
pub const NODE_ID_HEADER: &str = "x-sam-node-id";
/// Route header naming the target workspace.
pub const WORKSPACE_ID_HEADER: &str = "x-sam-workspace-id";
/// Workspace session cookie name.
pub const SESSION_COOKIE: &str = "sam_session";

const COOKIE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Which family authenticated the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFamily {
    Management,
    WorkspaceToken,
    Cookie,
}

/// Result of a successful gate pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: UserId,
    pub workspace_id: Option<String>,
    pub family: AuthFamily,
    /// Cookie issued for a token-authenticated browser request, to be set
    /// on the response.
    pub issued_cookie: Option<String>,
}

#[derive(Clone)]
struct CookieSession {
    workspace_id: String,
    user_id: String,
    expires_at: Instant,
}

/// In-memory workspace session cookie store.
pub struct SessionCookies {
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, CookieSession>>,
}

impl SessionCookies {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, sessions: Mutex::new(HashMap::new()) }
    }

    fn issue(&self, workspace_id: &str, user_id: &str) -> String {
        let value = nanoid::nanoid!(32);
        self.sessions.lock().insert(
            value.clone(),
            CookieSession {
                workspace_id: workspace_id.to_string(),
                user_id: user_id.to_string(),
                expires_at: self.clock.now() + COOKIE_TTL,
            },
        );
        value
    }

    fn validate(&self, value: &str) -> Option<CookieSession> {
        let mut sessions = self.sessions.lock();
        match sessions.get(value) {
            Some(session) if session.expires_at > self.clock.now() => Some(session.clone()),
            Some(_) => {
                sessions.remove(value);
                None
            }
            None => None,
        }
    }
}

/// The gate itself; one per daemon.
pub struct AuthGate {
    node_id: String,
    validator: Arc<dyn TokenValidator>,
    cookies: SessionCookies,
    allowed_origins: Vec<String>,
}

impl AuthGate {
    pub fn new(
        node_id: String,
        validator: Arc<dyn TokenValidator>,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            node_id,
            validator,
            cookies: SessionCookies::new(Arc::new(SystemClock)),
            allowed_origins,
        }
    }

    /// Route-header enforcement shared by every family.
    pub fn check_route(
        &self,
        headers: &HeaderMap,
        path_workspace: Option<&str>,
    ) -> Result<(), ApiError> {
        if let Some(node) = header_str(headers, NODE_ID_HEADER) {
            if node != self.node_id {
                return Err(ApiError::Forbidden("node route mismatch".to_string()));
            }
        }
        if let (Some(routed), Some(path)) =
            (header_str(headers, WORKSPACE_ID_HEADER), path_workspace)
        {
            if routed != path {
                return Err(ApiError::Forbidden("workspace route mismatch".to_string()));
            }
        }
        Ok(())
    }

    /// Node-management family: control-plane mutations.
    pub fn management(
        &self,
        headers: &HeaderMap,
        path_workspace: Option<&str>,
    ) -> Result<AuthContext, ApiError> {
        self.check_route(headers, path_workspace)?;
        let token = bearer_token(headers)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
        let claims = self
            .validator
            .validate_management(token)
            .map_err(|_| ApiError::Unauthorized("invalid bearer token".to_string()))?;
        check_workspace_claim(&claims, path_workspace)?;
        Ok(AuthContext {
            user_id: UserId::new(claims.sub.unwrap_or_else(|| "control-plane".to_string())),
            workspace_id: claims
                .workspace
                .or_else(|| path_workspace.map(|s| s.to_string())),
            family: AuthFamily::Management,
            issued_cookie: None,
        })
    }

    /// Workspace-request family: browser HTTP and WebSocket traffic.
    /// `workspace_id` is the routed workspace (path segment or query).
    pub fn workspace(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
        workspace_id: Option<&str>,
    ) -> Result<AuthContext, ApiError> {
        self.check_route(headers, workspace_id)?;
        let workspace_id = workspace_id.ok_or_else(ApiError::workspace_required)?;

        if let Some(cookie) = cookie_value(headers, SESSION_COOKIE) {
            if let Some(session) = self.cookies.validate(cookie) {
                if session.workspace_id != workspace_id {
                    return Err(ApiError::Forbidden("workspace claim mismatch".to_string()));
                }
                return Ok(AuthContext {
                    user_id: UserId::new(session.user_id),
                    workspace_id: Some(session.workspace_id),
                    family: AuthFamily::Cookie,
                    issued_cookie: None,
                });
            }
        }

        let token = query_token
            .ok_or_else(|| ApiError::Unauthorized("missing workspace credential".to_string()))?;
        let claims = self
            .validator
            .validate_workspace(token)
            .map_err(|_| ApiError::Unauthorized("invalid workspace token".to_string()))?;
        check_workspace_claim(&claims, Some(workspace_id))?;

        let user_id = claims.sub.unwrap_or_else(|| "workspace-user".to_string());
        let cookie = self.cookies.issue(workspace_id, &user_id);
        Ok(AuthContext {
            user_id: UserId::new(user_id),
            workspace_id: Some(workspace_id.to_string()),
            family: AuthFamily::WorkspaceToken,
            issued_cookie: Some(cookie),
        })
    }

    /// Node-event family: browser-facing read-only node endpoints.
    pub fn node_event(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<AuthContext, ApiError> {
        self.check_route(headers, None)?;

        let bearer = bearer_token(headers).or(query_token);
        if let Some(token) = bearer {
            if let Ok(claims) = self.validator.validate_management(token) {
                return Ok(AuthContext {
                    user_id: UserId::new(
                        claims.sub.unwrap_or_else(|| "control-plane".to_string()),
                    ),
                    workspace_id: claims.workspace,
                    family: AuthFamily::Management,
                    issued_cookie: None,
                });
            }
        }

        if let Some(cookie) = cookie_value(headers, SESSION_COOKIE) {
            if let Some(session) = self.cookies.validate(cookie) {
                return Ok(AuthContext {
                    user_id: UserId::new(session.user_id),
                    workspace_id: Some(session.workspace_id),
                    family: AuthFamily::Cookie,
                    issued_cookie: None,
                });
            }
        }

        Err(ApiError::Unauthorized("missing node credential".to_string()))
    }

    /// Origin allow-list for WebSocket upgrades. Requests without an Origin
    /// header (non-browser callers) pass.
    pub fn check_origin(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        match header_str(headers, "origin") {
            None => Ok(()),
            Some(origin) if origin_allowed(origin, &self.allowed_origins) => Ok(()),
            Some(origin) => {
                Err(ApiError::Forbidden(format!("origin not allowed: {origin}")))
            }
        }
    }
}

fn check_workspace_claim(claims: &Claims, workspace_id: Option<&str>) -> Result<(), ApiError> {
    if let (Some(claim), Some(routed)) = (claims.workspace.as_deref(), workspace_id) {
        if claim != routed {
            return Err(ApiError::Forbidden("workspace claim mismatch".to_string()));
        }
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).filter(|s| !s.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, "authorization")?.strip_prefix("Bearer ")
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let raw = header_str(headers, "cookie")?;
    raw.split(';').map(|part| part.trim()).find_map(|part| {
        part.strip_prefix(name).and_then(|rest| rest.strip_prefix('='))
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
