// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace runtime registry.
//!
//! One runtime per workspace id, hydrated on first contact from request
//! arguments, then persisted metadata, then derived defaults. Status moves
//! only through compare-and-swap against a caller-supplied expected set;
//! the registry mutex is held for map access and CAS only, never across I/O.

pub mod paths;
mod provision;

pub use provision::{start_workspace_provision, ProvisionDeps, ProvisionLabels};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use sam_core::{WorkspaceId, WorkspaceStatus};
use sam_storage::{Store, WorkspaceMeta};

use crate::config::NodeConfig;
use crate::pty::PtySessionManager;
use crate::workspace::paths::{
    adopt_legacy_dir, container_workdir_for, derive_workspace_dir, WORKSPACE_DIR_FALLBACK,
};

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("workspace not found: {0}")]
    NotFound(String),

    #[error("invalid_transition")]
    InvalidTransition { from: WorkspaceStatus },
}

/// Snapshot of one workspace's runtime state.
#[derive(Clone)]
pub struct WorkspaceRuntime {
    pub workspace_id: WorkspaceId,
    pub repository: String,
    pub branch: String,
    pub status: WorkspaceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub workspace_dir: String,
    pub container_label: String,
    pub container_workdir: String,
    pub container_user: String,
    pub callback_token: Option<String>,
    pub git_user_name: String,
    pub git_user_email: String,
    /// Each runtime owns its PTY manager except the legacy single-workspace
    /// shape, which shares the process-wide one.
    pub pty: PtySessionManager,
}

impl WorkspaceRuntime {
    fn to_meta(&self) -> WorkspaceMeta {
        WorkspaceMeta {
            workspace_id: self.workspace_id.as_str().to_string(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            status: self.status.to_string(),
            workspace_dir: self.workspace_dir.clone(),
            container_label: self.container_label.clone(),
            container_workdir: self.container_workdir.clone(),
            container_user: self.container_user.clone(),
            git_user_name: self.git_user_name.clone(),
            git_user_email: self.git_user_email.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

struct RegistryInner {
    config: NodeConfig,
    store: Store,
    shared_pty: PtySessionManager,
    entries: Mutex<HashMap<String, WorkspaceRuntime>>,
}

/// Registry of workspace runtimes, keyed by workspace id.
#[derive(Clone)]
pub struct WorkspaceRegistry {
    inner: Arc<RegistryInner>,
}

impl WorkspaceRegistry {
    pub fn new(config: NodeConfig, store: Store, shared_pty: PtySessionManager) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                store,
                shared_pty,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The single creation path. Creates or refreshes the runtime for
    /// `workspace_id` and returns a snapshot.
    pub fn upsert(
        &self,
        workspace_id: &WorkspaceId,
        repository: &str,
        branch: &str,
        status: WorkspaceStatus,
        callback_token: Option<String>,
    ) -> WorkspaceRuntime {
        // Hydration reads the store before taking the map lock.
        let meta = self
            .inner
            .store
            .get_workspace(workspace_id.as_str())
            .unwrap_or_else(|e| {
                warn!(workspace_id = %workspace_id, error = %e, "metadata read failed");
                None
            });

        let mut entries = self.inner.entries.lock();
        if let Some(existing) = entries.get_mut(workspace_id.as_str()) {
            let mut changed = false;
            if !repository.is_empty() && existing.repository != repository {
                existing.repository = repository.to_string();
                changed = true;
            }
            if !branch.is_empty() && existing.branch != branch {
                existing.branch = branch.to_string();
                changed = true;
            }
            if callback_token.is_some() {
                existing.callback_token = callback_token;
            }
            existing.updated_at = Utc::now();
            let snapshot = existing.clone();
            drop(entries);
            if changed {
                if let Err(e) = self.inner.store.upsert_workspace(&snapshot.to_meta()) {
                    warn!(workspace_id = %workspace_id, error = %e, "metadata persist failed");
                }
            }
            return snapshot;
        }

        let runtime = self.hydrate(workspace_id, repository, branch, status, callback_token, meta);
        entries.insert(workspace_id.as_str().to_string(), runtime.clone());
        drop(entries);

        if let Err(e) = self.inner.store.upsert_workspace(&runtime.to_meta()) {
            warn!(workspace_id = %workspace_id, error = %e, "metadata persist failed");
        }
        runtime
    }

    /// Build a fresh runtime: arguments, then persisted metadata, then
    /// derived defaults.
    fn hydrate(
        &self,
        workspace_id: &WorkspaceId,
        repository: &str,
        branch: &str,
        status: WorkspaceStatus,
        callback_token: Option<String>,
        meta: Option<WorkspaceMeta>,
    ) -> WorkspaceRuntime {
        let config = &self.inner.config;
        let meta_ref = meta.as_ref();

        let repository = pick(repository, meta_ref.map(|m| m.repository.as_str()), "");
        let branch = pick(branch, meta_ref.map(|m| m.branch.as_str()), "main");

        let mut workspace_dir = pick("", meta_ref.map(|m| m.workspace_dir.as_str()), "");
        if workspace_dir.is_empty() {
            workspace_dir = derive_workspace_dir(
                &config.base_dir,
                config.workspace_id.as_deref(),
                workspace_id.as_str(),
            )
            .to_string_lossy()
            .to_string();
        }

        let mut container_label = pick("", meta_ref.map(|m| m.container_label.as_str()), "");
        if container_label.is_empty() {
            container_label = if config.workspace_id.as_deref() == Some(workspace_id.as_str()) {
                config.container_label_value.clone().unwrap_or_else(|| {
                    workspace_id.as_str().to_string()
                })
            } else {
                workspace_id.as_str().to_string()
            };
        }

        // Legacy adoption: a recovering runtime whose recorded dir is the
        // base directory (or missing) takes over a pre-existing repo
        // directory sitting there, as both workspace dir and label.
        let recovering = meta.is_some();
        if recovering {
            let current = meta_ref.map(|m| m.workspace_dir.as_str()).unwrap_or("");
            if let Some(adopted) = adopt_legacy_dir(&config.base_dir, &repository, current) {
                workspace_dir = adopted.to_string_lossy().to_string();
                if let Some(name) = adopted.file_name() {
                    container_label = name.to_string_lossy().to_string();
                }
                debug!(workspace_id = %workspace_id, dir = %workspace_dir, "adopted legacy dir");
            }
        }

        if workspace_dir.is_empty() {
            workspace_dir = WORKSPACE_DIR_FALLBACK.to_string();
        }

        let mut container_workdir =
            pick("", meta_ref.map(|m| m.container_workdir.as_str()), "");
        if container_workdir.is_empty() {
            container_workdir = config
                .container_workdir
                .clone()
                .filter(|_| config.workspace_id.as_deref() == Some(workspace_id.as_str()))
                .unwrap_or_else(|| container_workdir_for(&repository, &workspace_dir));
        }

        let container_user = pick(
            "",
            meta_ref.map(|m| m.container_user.as_str()),
            config.container_user.as_deref().unwrap_or(""),
        )
        .to_string();

        let now = Utc::now();
        let created_at = meta_ref.map(|m| m.created_at).unwrap_or(now);

        let pty = self.pty_manager_for(
            workspace_id.as_str(),
            &workspace_dir,
            &container_label,
            &container_workdir,
        );

        WorkspaceRuntime {
            workspace_id: workspace_id.clone(),
            repository,
            branch,
            status,
            created_at,
            updated_at: now,
            workspace_dir,
            container_label,
            container_workdir,
            container_user,
            callback_token,
            git_user_name: meta_ref.map(|m| m.git_user_name.clone()).unwrap_or_default(),
            git_user_email: meta_ref.map(|m| m.git_user_email.clone()).unwrap_or_default(),
            pty,
        }
    }

    /// The process-wide PTY manager serves the legacy single-workspace shape:
    /// container mode off, or an exact match of the configured workspace id,
    /// dir, label, and workdir. Anything else gets its own manager.
    fn pty_manager_for(
        &self,
        workspace_id: &str,
        workspace_dir: &str,
        container_label: &str,
        container_workdir: &str,
    ) -> PtySessionManager {
        let config = &self.inner.config;
        let legacy = !config.container_mode
            || (config.workspace_id.as_deref() == Some(workspace_id)
                && config.workspace_dir.as_deref() == Some(workspace_dir)
                && config.container_label_value.as_deref() == Some(container_label)
                && config.container_workdir.as_deref() == Some(container_workdir));
        if legacy {
            self.inner.shared_pty.clone()
        } else {
            PtySessionManager::new(config.limits.pty_output_buffer_size)
        }
    }

    pub fn get(&self, workspace_id: &str) -> Option<WorkspaceRuntime> {
        self.inner.entries.lock().get(workspace_id).cloned()
    }

    pub fn remove(&self, workspace_id: &str) -> Option<WorkspaceRuntime> {
        self.inner.entries.lock().remove(workspace_id)
    }

    pub fn list(&self) -> Vec<WorkspaceRuntime> {
        let mut runtimes: Vec<WorkspaceRuntime> =
            self.inner.entries.lock().values().cloned().collect();
        runtimes.sort_by(|a, b| a.workspace_id.as_str().cmp(b.workspace_id.as_str()));
        runtimes
    }

    /// The only status mutator after creation: swap to `next` iff the
    /// current status is in `expected`. Returns the updated snapshot.
    pub fn cas(
        &self,
        workspace_id: &str,
        expected: &[WorkspaceStatus],
        next: WorkspaceStatus,
    ) -> Result<WorkspaceRuntime, RegistryError> {
        let snapshot = {
            let mut entries = self.inner.entries.lock();
            let runtime = entries
                .get_mut(workspace_id)
                .ok_or_else(|| RegistryError::NotFound(workspace_id.to_string()))?;
            if !expected.contains(&runtime.status) {
                return Err(RegistryError::InvalidTransition { from: runtime.status });
            }
            runtime.status = next;
            runtime.updated_at = Utc::now();
            runtime.clone()
        };

        if let Err(e) = self.inner.store.upsert_workspace(&snapshot.to_meta()) {
            warn!(workspace_id, error = %e, "metadata persist failed");
        }
        debug!(workspace_id, status = %next, "workspace status");
        Ok(snapshot)
    }

    /// Update git identity on an existing runtime (create request fields).
    pub fn set_git_identity(&self, workspace_id: &str, name: Option<&str>, email: Option<&str>) {
        let snapshot = {
            let mut entries = self.inner.entries.lock();
            let Some(runtime) = entries.get_mut(workspace_id) else { return };
            if let Some(name) = name {
                runtime.git_user_name = name.to_string();
            }
            if let Some(email) = email {
                runtime.git_user_email = email.to_string();
            }
            runtime.clone()
        };
        if let Err(e) = self.inner.store.upsert_workspace(&snapshot.to_meta()) {
            warn!(workspace_id, error = %e, "metadata persist failed");
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .values()
            .filter(|r| {
                matches!(r.status, WorkspaceStatus::Running | WorkspaceStatus::Recovery)
            })
            .count()
    }
}

/// First non-empty of: argument, persisted value, default.
fn pick<'a>(arg: &'a str, meta: Option<&'a str>, default: &'a str) -> String {
    if !arg.is_empty() {
        arg.to_string()
    } else if let Some(m) = meta.filter(|m| !m.is_empty()) {
        m.to_string()
    } else {
        default.to_string()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
