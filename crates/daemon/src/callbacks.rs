// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane callback client.
//!
//! Outbound calls carry `Authorization: Bearer <token>`; a workspace-scoped
//! callback token overrides the node token when present. Provisioning
//! failure reports retry on transient errors only: 5xx, 408, 429, and
//! network failures retry, every other 4xx short-circuits.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from control-plane calls.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("control plane not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Network(String),

    #[error("permanent failure: status {0}")]
    Permanent(u16),

    #[error("transient failure: status {0}")]
    Transient(u16),
}

impl CallbackError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_) | Self::NotConfigured)
    }
}

/// Classify an HTTP status for retry purposes.
pub fn classify_status(status: u16) -> Option<CallbackError> {
    match status {
        200..=299 => None,
        408 | 429 => Some(CallbackError::Transient(status)),
        400..=499 => Some(CallbackError::Permanent(status)),
        _ => Some(CallbackError::Transient(status)),
    }
}

/// Heartbeat body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
    pub node_id: String,
    pub active_workspaces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
}

/// Outbound control-plane surface consumed by the daemon core.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// `POST /api/nodes/{nodeId}/ready`, once at startup.
    async fn node_ready(&self) -> Result<(), CallbackError>;

    /// `POST /api/nodes/{nodeId}/heartbeat`, periodic.
    async fn heartbeat(&self, body: &HeartbeatBody) -> Result<(), CallbackError>;

    /// `POST /api/workspaces/{id}/provisioning-failed`, with bounded retry.
    async fn provisioning_failed(
        &self,
        workspace_id: &str,
        error_message: &str,
        token_override: Option<&str>,
    ) -> Result<(), CallbackError>;

    /// `POST /api/workspaces/{id}/git-token`; `None` when the control plane
    /// has no token for this workspace.
    async fn fetch_git_token(
        &self,
        workspace_id: &str,
        token_override: Option<&str>,
    ) -> Result<Option<String>, CallbackError>;

    /// `GET /api/runtime-assets` for the project.
    async fn fetch_runtime_assets(
        &self,
        token_override: Option<&str>,
    ) -> Result<serde_json::Value, CallbackError>;
}

/// Reqwest-backed control plane client.
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: Option<String>,
    node_id: String,
    node_token: Option<String>,
    retries: u32,
}

impl HttpControlPlane {
    pub fn new(
        base_url: Option<String>,
        node_id: String,
        node_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, base_url, node_id, node_token, retries: 3 }
    }

    fn base(&self) -> Result<&str, CallbackError> {
        self.base_url.as_deref().ok_or(CallbackError::NotConfigured)
    }

    fn bearer<'a>(&'a self, token_override: Option<&'a str>) -> Option<&'a str> {
        token_override.or(self.node_token.as_deref())
    }

    async fn post_json(
        &self,
        url: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<(), CallbackError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response =
            request.send().await.map_err(|e| CallbackError::Network(e.to_string()))?;
        match classify_status(response.status().as_u16()) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn node_ready(&self) -> Result<(), CallbackError> {
        let url = format!("{}/api/nodes/{}/ready", self.base()?, self.node_id);
        self.post_json(&url, self.bearer(None), &serde_json::json!({})).await
    }

    async fn heartbeat(&self, body: &HeartbeatBody) -> Result<(), CallbackError> {
        let url = format!("{}/api/nodes/{}/heartbeat", self.base()?, self.node_id);
        let value = serde_json::to_value(body)
            .map_err(|e| CallbackError::Network(e.to_string()))?;
        self.post_json(&url, self.bearer(None), &value).await
    }

    async fn provisioning_failed(
        &self,
        workspace_id: &str,
        error_message: &str,
        token_override: Option<&str>,
    ) -> Result<(), CallbackError> {
        let url = format!("{}/api/workspaces/{}/provisioning-failed", self.base()?, workspace_id);
        let body = serde_json::json!({"errorMessage": error_message});
        let token = self.bearer(token_override);

        let mut last = CallbackError::Network("no attempt made".to_string());
        for attempt in 0..self.retries {
            match self.post_json(&url, token, &body).await {
                Ok(()) => {
                    debug!(workspace_id, "provisioning-failed callback delivered");
                    return Ok(());
                }
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) => {
                    warn!(workspace_id, attempt, error = %e,
                        "provisioning-failed callback retry");
                    last = e;
                    tokio::time::sleep(Duration::from_millis(250 * (attempt as u64 + 1)))
                        .await;
                }
            }
        }
        Err(last)
    }

    async fn fetch_git_token(
        &self,
        workspace_id: &str,
        token_override: Option<&str>,
    ) -> Result<Option<String>, CallbackError> {
        let url = format!("{}/api/workspaces/{}/git-token", self.base()?, workspace_id);
        let mut request = self.client.post(&url).json(&serde_json::json!({}));
        if let Some(token) = self.bearer(token_override) {
            request = request.bearer_auth(token);
        }
        let response =
            request.send().await.map_err(|e| CallbackError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if let Some(err) = classify_status(status) {
            return Err(err);
        }
        let body: serde_json::Value =
            response.json().await.map_err(|e| CallbackError::Network(e.to_string()))?;
        Ok(body.get("token").and_then(|t| t.as_str()).map(|t| t.to_string()))
    }

    async fn fetch_runtime_assets(
        &self,
        token_override: Option<&str>,
    ) -> Result<serde_json::Value, CallbackError> {
        let url = format!("{}/api/runtime-assets", self.base()?);
        let mut request = self.client.get(&url);
        if let Some(token) = self.bearer(token_override) {
            request = request.bearer_auth(token);
        }
        let response =
            request.send().await.map_err(|e| CallbackError::Network(e.to_string()))?;
        if let Some(err) = classify_status(response.status().as_u16()) {
            return Err(err);
        }
        response.json().await.map_err(|e| CallbackError::Network(e.to_string()))
    }
}

#[cfg(test)]
#[path = "callbacks_tests.rs"]
mod tests;
