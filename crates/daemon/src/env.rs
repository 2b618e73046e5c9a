// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

/// Daemon version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn duration_ms(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn string(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

/// Node identifier assigned by the control plane.
pub fn node_id() -> String {
    string("SAM_NODE_ID").unwrap_or_else(|| "node-local".to_string())
}

/// Listen address, default `0.0.0.0:8080`.
pub fn bind_addr() -> String {
    string("SAM_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string())
}

/// Host directory under which workspace directories are created.
pub fn base_dir() -> PathBuf {
    string("SAM_BASE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/srv/workspaces"))
}

/// Path of the SQLite database used for workspace/tab recovery.
pub fn state_db() -> PathBuf {
    string("SAM_STATE_DB").map(PathBuf::from).unwrap_or_else(|| base_dir().join("sam.db"))
}

/// Base URL of the control plane for outbound callbacks.
pub fn control_plane_url() -> Option<String> {
    string("SAM_CONTROL_PLANE_URL")
}

/// Node-level callback token for outbound calls. Workspace-scoped callback
/// tokens override it when present.
pub fn node_callback_token() -> Option<String> {
    string("SAM_CALLBACK_TOKEN")
}

/// Shared secret for node-management JWTs.
pub fn management_secret() -> Option<String> {
    string("SAM_MANAGEMENT_SECRET")
}

/// Shared secret for workspace-scoped JWTs. Falls back to the management
/// secret when unset.
pub fn workspace_secret() -> Option<String> {
    string("SAM_WORKSPACE_SECRET").or_else(management_secret)
}

/// Comma-separated WebSocket origin allow-list. `*`, exact origins, and
/// `https://*.domain` patterns are supported.
pub fn allowed_origins() -> Vec<String> {
    string("SAM_ALLOWED_ORIGINS")
        .map(|s| s.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
        .unwrap_or_else(|| vec!["*".to_string()])
}

/// Legacy single-workspace configuration: workspace id.
pub fn workspace_id() -> Option<String> {
    string("SAM_WORKSPACE_ID")
}

/// Legacy single-workspace configuration: workspace directory.
pub fn workspace_dir() -> Option<String> {
    string("SAM_WORKSPACE_DIR")
}

/// Legacy single-workspace configuration: container label value.
pub fn container_label_value() -> Option<String> {
    string("SAM_CONTAINER_LABEL")
}

/// Legacy single-workspace configuration: container working directory.
pub fn container_workdir() -> Option<String> {
    string("SAM_CONTAINER_WORKDIR")
}

/// User to exec as inside the container.
pub fn container_user() -> Option<String> {
    string("SAM_CONTAINER_USER")
}

/// Whether terminals exec into devcontainers (on) or run on the host (off).
pub fn container_mode() -> bool {
    string("SAM_CONTAINER_MODE").map(|s| s == "1" || s == "true").unwrap_or(false)
}

/// Per-provision timeout. Zero disables the timeout.
pub fn bootstrap_timeout() -> Duration {
    duration_ms("SAM_BOOTSTRAP_TIMEOUT_MS", Duration::from_secs(600))
}

/// Outbound HTTP timeout for control-plane calls.
pub fn http_read_timeout() -> Duration {
    duration_ms("SAM_HTTP_READ_TIMEOUT_MS", Duration::from_secs(15))
}

/// Heartbeat interval.
pub fn heartbeat_interval() -> Duration {
    duration_ms("SAM_HEARTBEAT_INTERVAL_MS", Duration::from_secs(30))
}

/// Per-write deadline for WebSocket sends.
pub fn ws_write_timeout() -> Duration {
    duration_ms("SAM_WS_WRITE_TIMEOUT_MS", Duration::from_secs(10))
}

/// Agent child process initialize timeout.
pub fn acp_init_timeout() -> Duration {
    duration_ms("SAM_ACP_INIT_TIMEOUT_MS", Duration::from_secs(30))
}

/// Agent prompt timeout before an automatic cancel.
pub fn acp_prompt_timeout() -> Duration {
    duration_ms("SAM_ACP_PROMPT_TIMEOUT_MS", Duration::from_secs(600))
}

/// Grace period after a prompt cancel before the turn is forced back to ready.
pub fn acp_prompt_cancel_grace() -> Duration {
    duration_ms("SAM_ACP_CANCEL_GRACE_MS", Duration::from_secs(5))
}

/// Automatic agent restarts permitted after abnormal exit.
pub fn acp_restart_budget() -> u32 {
    std::env::var("SAM_ACP_RESTART_BUDGET").ok().and_then(|s| s.parse().ok()).unwrap_or(1)
}
