// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interfaces to the devcontainer provisioner and container discovery.
//!
//! The provisioner itself is an external collaborator; the daemon depends
//! only on these seams. The default implementations shell out to the
//! `devcontainer` and `docker` CLIs.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Errors from provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{0}")]
    Failed(String),

    #[error("provisioning timed out")]
    Timeout,
}

/// Errors from container discovery.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("devcontainer not available: {0}")]
    Unavailable(String),

    #[error("no running devcontainer found for {0}")]
    NotRunning(String),

    #[error("container lookup failed: {0}")]
    Lookup(String),
}

impl ContainerError {
    /// Whether this error means the container can be recovered by
    /// re-provisioning the workspace in place.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::NotRunning(_))
    }
}

/// Everything `prepare_workspace` consumes. All fields come from the
/// workspace runtime, never from process-global config, so recovering one
/// workspace cannot disturb another.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub workspace_id: String,
    pub repository: String,
    pub branch: String,
    pub workspace_dir: String,
    pub container_label: String,
    pub container_workdir: String,
    pub container_user: String,
    pub callback_token: Option<String>,
    pub git_user_name: String,
    pub git_user_email: String,
    pub git_token: Option<String>,
    pub runtime_assets: Option<serde_json::Value>,
}

/// Sink for provisioning progress, bound to the workspace's boot-log
/// broadcaster by the orchestrator.
pub trait ProvisionReporter: Send + Sync {
    fn report(&self, step: &str, status: &str, message: &str, detail: serde_json::Value);
}

/// The provisioner seam. `prepare_workspace` returns whether the workspace
/// came up in recovery mode (host fallback instead of a devcontainer).
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    async fn prepare_workspace(
        &self,
        cfg: &ProvisionConfig,
        reporter: &dyn ProvisionReporter,
    ) -> Result<bool, ProvisionError>;

    /// Remove the workspace's container volume on delete.
    async fn remove_volume(&self, workspace_id: &str) -> Result<(), ProvisionError>;
}

/// Resolved devcontainer for exec targets.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContainer {
    pub container_id: String,
    pub workdir: String,
    pub user: String,
}

/// Container discovery seam.
#[async_trait]
pub trait ContainerResolver: Send + Sync {
    async fn resolve(&self, container_label: &str) -> Result<ResolvedContainer, ContainerError>;
}

/// Discovery via `docker ps` filtered on the workspace label.
pub struct DockerContainerResolver {
    label_key: String,
}

impl DockerContainerResolver {
    pub fn new() -> Self {
        Self { label_key: "sam.workspace".to_string() }
    }
}

impl Default for DockerContainerResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerResolver for DockerContainerResolver {
    async fn resolve(&self, container_label: &str) -> Result<ResolvedContainer, ContainerError> {
        let output = tokio::process::Command::new("docker")
            .args([
                "ps",
                "--filter",
                &format!("label={}={}", self.label_key, container_label),
                "--format",
                "{{.ID}}",
            ])
            .output()
            .await
            .map_err(|e| ContainerError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(ContainerError::Lookup(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ContainerError::NotRunning(container_label.to_string()));
        }
        let id = id.lines().next().unwrap_or_default().to_string();
        debug!(container_label, container_id = %id, "resolved devcontainer");
        Ok(ResolvedContainer { container_id: id, workdir: String::new(), user: String::new() })
    }
}

/// Provisioner shelling out to the `devcontainer` CLI.
pub struct DevcontainerCliProvisioner;

#[async_trait]
impl WorkspaceProvisioner for DevcontainerCliProvisioner {
    async fn prepare_workspace(
        &self,
        cfg: &ProvisionConfig,
        reporter: &dyn ProvisionReporter,
    ) -> Result<bool, ProvisionError> {
        reporter.report(
            "devcontainer",
            "running",
            "starting devcontainer",
            serde_json::json!({"workspaceDir": cfg.workspace_dir}),
        );
        let output = tokio::process::Command::new("devcontainer")
            .args(["up", "--workspace-folder", &cfg.workspace_dir])
            .output()
            .await
            .map_err(|e| ProvisionError::Failed(format!("devcontainer up: {e}")))?;

        if output.status.success() {
            reporter.report(
                "devcontainer",
                "done",
                "devcontainer ready",
                serde_json::Value::Null,
            );
            Ok(false)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            reporter.report(
                "devcontainer",
                "failed",
                "devcontainer start failed, falling back to host",
                serde_json::json!({"stderr": stderr}),
            );
            // Host fallback: the workspace directory exists, terminals run on
            // the host, and the workspace surfaces as `recovery`.
            Ok(true)
        }
    }

    async fn remove_volume(&self, workspace_id: &str) -> Result<(), ProvisionError> {
        let output = tokio::process::Command::new("docker")
            .args(["volume", "rm", "-f", &format!("sam-{workspace_id}")])
            .output()
            .await
            .map_err(|e| ProvisionError::Failed(format!("volume rm: {e}")))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ProvisionError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}
