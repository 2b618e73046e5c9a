// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provisioning orchestrator.
//!
//! Sequences token/asset fetch, `prepare_workspace`, and the status CAS.
//! Runs as a spawned task; the HTTP request that triggered it has already
//! returned 202. A completion whose CAS fails (the user stopped the
//! workspace mid-provision) never overwrites the terminal state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use sam_core::{EventLevel, WorkspaceStatus};

use crate::bootlog::{BootLogBroadcaster, BootLogManager};
use crate::callbacks::ControlPlane;
use crate::events::EventAppender;
use crate::provisioner::{
    ProvisionConfig, ProvisionError, ProvisionReporter, WorkspaceProvisioner,
};
use crate::workspace::{WorkspaceRegistry, WorkspaceRuntime};

/// Dependencies the orchestrator needs; all shared handles.
#[derive(Clone)]
pub struct ProvisionDeps {
    pub registry: WorkspaceRegistry,
    pub control: Arc<dyn ControlPlane>,
    pub provisioner: Arc<dyn WorkspaceProvisioner>,
    pub bootlog: Arc<BootLogManager>,
    pub events: Arc<dyn EventAppender>,
    /// Per-provision timeout; zero disables it.
    pub bootstrap_timeout: Duration,
}

/// Event labels for one provisioning run, set by the triggering verb
/// (create, restart, rebuild, recover).
#[derive(Debug, Clone)]
pub struct ProvisionLabels {
    pub failure_type: String,
    pub failure_message: String,
    pub success_type: String,
    pub success_message: String,
    pub detail: serde_json::Value,
}

impl ProvisionLabels {
    pub fn create() -> Self {
        Self {
            failure_type: "workspace.provisioning_failed".to_string(),
            failure_message: "workspace provisioning failed".to_string(),
            success_type: "workspace.provisioned".to_string(),
            success_message: "workspace provisioned".to_string(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn restart() -> Self {
        Self {
            failure_type: "workspace.restart_failed".to_string(),
            failure_message: "workspace restart failed".to_string(),
            success_type: "workspace.restarted".to_string(),
            success_message: "workspace restarted".to_string(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn rebuild() -> Self {
        Self {
            failure_type: "workspace.rebuild_failed".to_string(),
            failure_message: "workspace rebuild failed".to_string(),
            success_type: "workspace.rebuilt".to_string(),
            success_message: "workspace rebuilt".to_string(),
            detail: serde_json::json!({"rebuild": true}),
        }
    }

    pub fn recover() -> Self {
        Self {
            failure_type: "workspace.recovery_failed".to_string(),
            failure_message: "workspace recovery failed".to_string(),
            success_type: "workspace.recovered".to_string(),
            success_message: "workspace recovered".to_string(),
            detail: serde_json::json!({"autoRecovery": true}),
        }
    }
}

struct BootLogReporter {
    broadcaster: Arc<BootLogBroadcaster>,
}

impl ProvisionReporter for BootLogReporter {
    fn report(&self, step: &str, status: &str, message: &str, detail: serde_json::Value) {
        self.broadcaster.broadcast(step, status, message, detail);
    }
}

/// Kick off provisioning for `runtime` in the background.
pub fn start_workspace_provision(
    deps: ProvisionDeps,
    runtime: WorkspaceRuntime,
    labels: ProvisionLabels,
) -> JoinHandle<()> {
    tokio::spawn(run_provision(deps, runtime, labels))
}

async fn run_provision(deps: ProvisionDeps, runtime: WorkspaceRuntime, labels: ProvisionLabels) {
    let workspace_id = runtime.workspace_id.as_str().to_string();
    let token = runtime.callback_token.as_deref();

    // A missing git token is not fatal; provisioning proceeds without it.
    let git_token = match deps.control.fetch_git_token(&workspace_id, token).await {
        Ok(t) => t,
        Err(e) => {
            warn!(workspace_id, error = %e, "git token fetch failed, proceeding without");
            None
        }
    };
    let runtime_assets = match deps.control.fetch_runtime_assets(token).await {
        Ok(assets) => Some(assets),
        Err(e) => {
            warn!(workspace_id, error = %e, "runtime assets fetch failed, proceeding without");
            None
        }
    };

    let broadcaster = deps.bootlog.get_or_create(&workspace_id);
    let reporter = BootLogReporter { broadcaster: Arc::clone(&broadcaster) };

    let cfg = ProvisionConfig {
        workspace_id: workspace_id.clone(),
        repository: runtime.repository.clone(),
        branch: runtime.branch.clone(),
        workspace_dir: runtime.workspace_dir.clone(),
        container_label: runtime.container_label.clone(),
        container_workdir: runtime.container_workdir.clone(),
        container_user: runtime.container_user.clone(),
        callback_token: runtime.callback_token.clone(),
        git_user_name: runtime.git_user_name.clone(),
        git_user_email: runtime.git_user_email.clone(),
        git_token,
        runtime_assets,
    };

    let result = if deps.bootstrap_timeout.is_zero() {
        deps.provisioner.prepare_workspace(&cfg, &reporter).await
    } else {
        match tokio::time::timeout(
            deps.bootstrap_timeout,
            deps.provisioner.prepare_workspace(&cfg, &reporter),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Timeout),
        }
    };

    // Late joiners must always see completion, success or not.
    broadcaster.mark_complete();

    match result {
        Err(e) => {
            let message = e.to_string();
            if let Err(cas_err) =
                deps.registry.cas(&workspace_id, &[WorkspaceStatus::Creating], WorkspaceStatus::Error)
            {
                warn!(workspace_id, error = %cas_err,
                    "provision failed but workspace left creating state, not overwriting");
            }
            if let Err(cb_err) =
                deps.control.provisioning_failed(&workspace_id, &message, token).await
            {
                warn!(workspace_id, error = %cb_err, "provisioning-failed callback undelivered");
            }
            deps.events.append(
                Some(&workspace_id),
                EventLevel::Error,
                &labels.failure_type,
                &labels.failure_message,
                serde_json::json!({"error": message}),
            );
        }
        Ok(recovery_mode) => {
            let next = if recovery_mode {
                WorkspaceStatus::Recovery
            } else {
                WorkspaceStatus::Running
            };
            match deps.registry.cas(&workspace_id, &[WorkspaceStatus::Creating], next) {
                Ok(_) => {
                    let mut detail = labels.detail.clone();
                    if recovery_mode {
                        let map = detail.as_object_mut().map(|m| {
                            m.insert("devcontainerFallback".to_string(), true.into());
                            m.insert("recoveryMode".to_string(), true.into());
                        });
                        if map.is_none() {
                            detail = serde_json::json!({
                                "devcontainerFallback": true,
                                "recoveryMode": true,
                            });
                        }
                    }
                    info!(workspace_id, status = %next, "workspace provisioned");
                    deps.events.append(
                        Some(&workspace_id),
                        EventLevel::Info,
                        &labels.success_type,
                        &labels.success_message,
                        detail,
                    );
                }
                Err(e) => {
                    // The user stopped (or deleted) the workspace while it
                    // provisioned; the terminal state wins.
                    warn!(workspace_id, error = %e, "provision completion lost CAS race");
                    deps.events.append(
                        Some(&workspace_id),
                        EventLevel::Info,
                        "workspace.provision_superseded",
                        "provisioning completed after the workspace left creating state",
                        serde_json::Value::Null,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
