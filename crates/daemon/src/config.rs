// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node configuration assembled from the environment.

use std::path::PathBuf;
use std::time::Duration;

use sam_core::Limits;

use crate::env;

/// Timers and budgets for agent session hosts.
#[derive(Debug, Clone)]
pub struct AcpConfig {
    pub init_timeout: Duration,
    pub prompt_timeout: Duration,
    pub prompt_cancel_grace: Duration,
    pub restart_budget: u32,
}

impl Default for AcpConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(30),
            prompt_timeout: Duration::from_secs(600),
            prompt_cancel_grace: Duration::from_secs(5),
            restart_budget: 1,
        }
    }
}

/// Full daemon configuration.
///
/// The legacy single-workspace fields describe the pre-multiplexing
/// deployment shape where the node served exactly one workspace rooted at
/// `base_dir`; they steer path derivation and PTY-manager sharing.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub bind_addr: String,
    pub base_dir: PathBuf,
    pub state_db: PathBuf,
    pub control_plane_url: Option<String>,
    pub node_callback_token: Option<String>,
    pub management_secret: Option<String>,
    pub workspace_secret: Option<String>,
    pub allowed_origins: Vec<String>,

    // Legacy single-workspace configuration
    pub workspace_id: Option<String>,
    pub workspace_dir: Option<String>,
    pub container_label_value: Option<String>,
    pub container_workdir: Option<String>,
    pub container_user: Option<String>,
    pub container_mode: bool,

    pub bootstrap_timeout: Duration,
    pub http_read_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub ws_write_timeout: Duration,

    pub limits: Limits,
    pub acp: AcpConfig,
}

impl NodeConfig {
    /// Read the full configuration from `SAM_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            node_id: env::node_id(),
            bind_addr: env::bind_addr(),
            base_dir: env::base_dir(),
            state_db: env::state_db(),
            control_plane_url: env::control_plane_url(),
            node_callback_token: env::node_callback_token(),
            management_secret: env::management_secret(),
            workspace_secret: env::workspace_secret(),
            allowed_origins: env::allowed_origins(),
            workspace_id: env::workspace_id(),
            workspace_dir: env::workspace_dir(),
            container_label_value: env::container_label_value(),
            container_workdir: env::container_workdir(),
            container_user: env::container_user(),
            container_mode: env::container_mode(),
            bootstrap_timeout: env::bootstrap_timeout(),
            http_read_timeout: env::http_read_timeout(),
            heartbeat_interval: env::heartbeat_interval(),
            ws_write_timeout: env::ws_write_timeout(),
            limits: Limits::default(),
            acp: AcpConfig {
                init_timeout: env::acp_init_timeout(),
                prompt_timeout: env::acp_prompt_timeout(),
                prompt_cancel_grace: env::acp_prompt_cancel_grace(),
                restart_budget: env::acp_restart_budget(),
            },
        }
    }

    /// Minimal configuration for tests: everything local, no control plane,
    /// permissive origins, host-mode terminals.
    pub fn for_tests(base_dir: PathBuf) -> Self {
        Self {
            node_id: "node-test".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            state_db: base_dir.join("sam.db"),
            base_dir,
            control_plane_url: None,
            node_callback_token: None,
            management_secret: Some("management-secret".to_string()),
            workspace_secret: Some("workspace-secret".to_string()),
            allowed_origins: vec!["*".to_string()],
            workspace_id: None,
            workspace_dir: None,
            container_label_value: None,
            container_workdir: None,
            container_user: None,
            container_mode: false,
            bootstrap_timeout: Duration::from_secs(5),
            http_read_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(3600),
            ws_write_timeout: Duration::from_secs(5),
            limits: Limits::default(),
            acp: AcpConfig::default(),
        }
    }
}
