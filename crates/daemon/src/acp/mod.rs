// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent (ACP) session management.
//!
//! Session records carry status and the agent-side session id; hosts carry
//! the live child process and viewer fan-out. The two are decoupled: a
//! record survives suspend and node restart (via the tabs table), a host
//! exists only while the agent process runs. At most one host exists per
//! `(workspace, session)`.

mod host;
mod launcher;

pub use host::{
    HostCallbacks, HostError, HostParams, HostStatus, PromptOutcome, SessionHost,
};
pub use launcher::{
    AgentCommands, AgentError, AgentHandle, AgentLauncher, AgentMessage, AgentMessageKind,
    AgentSpawnSpec, StdioAgentLauncher,
};
#[cfg(any(test, feature = "test-support"))]
pub(crate) use launcher::AgentCommand;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use sam_core::{
    AgentSession, AgentSessionStatus, Limits, SessionId, TabKind, TabRecord, WorkspaceId,
};
use sam_storage::Store;

use crate::config::AcpConfig;
use crate::events::EventAppender;
use crate::provisioner::ResolvedContainer;

/// Agent binary started when a session does not name one.
pub const DEFAULT_AGENT_TYPE: &str = "claude-code-acp";

/// Errors from agent session operations.
#[derive(Debug, Error)]
pub enum AcpError {
    #[error("session not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

type SessionKey = (String, String);

struct Records {
    sessions: HashMap<SessionKey, AgentSession>,
    /// `(workspace, idempotency key)` → session id of the original create.
    idempotency: HashMap<SessionKey, String>,
}

struct AcpInner {
    store: Store,
    events: Arc<dyn EventAppender>,
    launcher: Arc<dyn AgentLauncher>,
    config: AcpConfig,
    limits: Limits,
    records: Mutex<Records>,
    hosts: Mutex<HashMap<SessionKey, Arc<SessionHost>>>,
}

/// Container resolution results the WS handler feeds into host creation.
#[derive(Debug, Clone)]
pub struct HostSpawnContext {
    pub workdir: String,
    pub container: Option<ResolvedContainer>,
}

/// Manager of all agent sessions on the node.
#[derive(Clone)]
pub struct AcpSessionManager {
    inner: Arc<AcpInner>,
}

impl AcpSessionManager {
    pub fn new(
        store: Store,
        events: Arc<dyn EventAppender>,
        launcher: Arc<dyn AgentLauncher>,
        config: AcpConfig,
        limits: Limits,
    ) -> Self {
        Self {
            inner: Arc::new(AcpInner {
                store,
                events,
                launcher,
                config,
                limits,
                records: Mutex::new(Records {
                    sessions: HashMap::new(),
                    idempotency: HashMap::new(),
                }),
                hosts: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn key(workspace_id: &WorkspaceId, session_id: &SessionId) -> SessionKey {
        (workspace_id.as_str().to_string(), session_id.as_str().to_string())
    }

    /// Create a session record. A replay with the same `Idempotency-Key`
    /// returns the original session without side effects.
    pub fn create_session(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
        label: &str,
        agent_type: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<(AgentSession, bool), AcpError> {
        let tab;
        let session = {
            let mut records = self.inner.records.lock();

            if let Some(key) = idempotency_key {
                let idem_key = (workspace_id.as_str().to_string(), key.to_string());
                if let Some(original) = records.idempotency.get(&idem_key).cloned() {
                    let existing = records
                        .sessions
                        .get(&(workspace_id.as_str().to_string(), original))
                        .cloned()
                        .ok_or(AcpError::NotFound)?;
                    return Ok((existing, false));
                }
            }

            let key = Self::key(workspace_id, session_id);
            if records.sessions.contains_key(&key) {
                return Err(AcpError::Conflict("session already exists".to_string()));
            }

            let mut session = AgentSession::new(
                workspace_id.clone(),
                session_id.clone(),
                if label.is_empty() { session_id.as_str().to_string() } else { label.to_string() },
            );
            session.agent_type =
                Some(agent_type.unwrap_or(DEFAULT_AGENT_TYPE).to_string());
            records.sessions.insert(key, session.clone());

            if let Some(idem) = idempotency_key {
                records.idempotency.insert(
                    (workspace_id.as_str().to_string(), idem.to_string()),
                    session_id.as_str().to_string(),
                );
            }

            tab = TabRecord {
                workspace_id: workspace_id.clone(),
                tab_id: session_id.clone(),
                kind: TabKind::Chat,
                title: session.label.clone(),
                sort_order: records.sessions.len() as i64,
                acp_session_id: None,
                agent_id: session.agent_type.clone(),
                created_at: Utc::now(),
            };
            session
        };

        if let Err(e) = self.inner.store.upsert_tab(&tab) {
            warn!(workspace_id = %workspace_id, session_id = %session_id, error = %e,
                "tab persist failed");
        }
        Ok((session, true))
    }

    pub fn get(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
    ) -> Option<AgentSession> {
        self.inner
            .records
            .lock()
            .sessions
            .get(&Self::key(workspace_id, session_id))
            .cloned()
    }

    pub fn list(&self, workspace_id: &WorkspaceId) -> Vec<AgentSession> {
        let mut sessions: Vec<AgentSession> = self
            .inner
            .records
            .lock()
            .sessions
            .values()
            .filter(|s| s.workspace_id == *workspace_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    /// Live host status and viewer count, when a host exists.
    pub fn host_view(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
    ) -> Option<(String, usize)> {
        self.inner
            .hosts
            .lock()
            .get(&Self::key(workspace_id, session_id))
            .map(|h| (h.status().to_string(), h.viewer_count()))
    }

    pub fn host(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
    ) -> Option<Arc<SessionHost>> {
        self.inner.hosts.lock().get(&Self::key(workspace_id, session_id)).cloned()
    }

    /// Stop a session. Repeat stops are no-ops returning the stopped record.
    /// Stop is the one operation that clears the agent-side session id.
    pub async fn stop(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
    ) -> Result<AgentSession, AcpError> {
        let host = self.inner.hosts.lock().remove(&Self::key(workspace_id, session_id));
        if let Some(host) = host {
            host.stop().await;
        }

        let session = {
            let mut records = self.inner.records.lock();
            let session = records
                .sessions
                .get_mut(&Self::key(workspace_id, session_id))
                .ok_or(AcpError::NotFound)?;
            if session.status != AgentSessionStatus::Stopped {
                session.status = AgentSessionStatus::Stopped;
                session.acp_session_id = None;
                session.stopped_at = Some(Utc::now());
                session.touch();
            }
            session.clone()
        };

        if let Err(e) = self.inner.store.set_tab_acp_session(
            workspace_id.as_str(),
            session_id.as_str(),
            None,
            None,
        ) {
            warn!(workspace_id = %workspace_id, error = %e, "tab acp clear failed");
        }
        Ok(session)
    }

    /// Suspend: kill the child but keep the record and its agent-side
    /// session id so the next attach resumes the conversation.
    pub async fn suspend(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
    ) -> Result<AgentSession, AcpError> {
        let host = self.inner.hosts.lock().remove(&Self::key(workspace_id, session_id));
        let preserved = match host {
            Some(host) => host.suspend().await,
            None => None,
        };

        let session = {
            let mut records = self.inner.records.lock();
            let session = records
                .sessions
                .get_mut(&Self::key(workspace_id, session_id))
                .ok_or(AcpError::NotFound)?;
            match session.status {
                AgentSessionStatus::Stopped => {
                    return Err(AcpError::Conflict("session_not_running".to_string()))
                }
                AgentSessionStatus::Suspended => return Ok(session.clone()),
                AgentSessionStatus::Running => {}
            }
            session.status = AgentSessionStatus::Suspended;
            if preserved.is_some() {
                session.acp_session_id = preserved;
            }
            session.touch();
            session.clone()
        };

        if let Err(e) = self.inner.store.set_tab_acp_session(
            workspace_id.as_str(),
            session_id.as_str(),
            session.acp_session_id.as_deref(),
            session.agent_type.as_deref(),
        ) {
            warn!(workspace_id = %workspace_id, error = %e, "tab acp persist failed");
        }
        Ok(session)
    }

    /// Resume only flips the record back to running. No host is created
    /// eagerly; the next viewer attach creates one and the hydrated
    /// agent-side session id triggers a session load in the agent.
    pub fn resume(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
    ) -> Result<AgentSession, AcpError> {
        let mut records = self.inner.records.lock();
        let session = records
            .sessions
            .get_mut(&Self::key(workspace_id, session_id))
            .ok_or(AcpError::NotFound)?;
        match session.status {
            AgentSessionStatus::Stopped => {
                Err(AcpError::Conflict("session_not_running".to_string()))
            }
            AgentSessionStatus::Running => Ok(session.clone()),
            AgentSessionStatus::Suspended => {
                session.status = AgentSessionStatus::Running;
                session.touch();
                Ok(session.clone())
            }
        }
    }

    /// Find or reconstruct the record a viewer is attaching to. After a node
    /// restart the in-memory record is gone but the persisted tab still
    /// carries the agent-side session id.
    pub fn ensure_session_for_attach(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
        idempotency_key: Option<&str>,
        worktree_path: Option<&str>,
    ) -> Result<AgentSession, AcpError> {
        if let Some(existing) = self.get(workspace_id, session_id) {
            return Ok(existing);
        }

        let tab = self
            .inner
            .store
            .get_tab(workspace_id.as_str(), session_id.as_str())
            .unwrap_or_default();
        if let Some(tab) = tab.filter(|t| t.kind == TabKind::Chat) {
            let mut records = self.inner.records.lock();
            let session = records
                .sessions
                .entry(Self::key(workspace_id, session_id))
                .or_insert_with(|| {
                    let mut session = AgentSession::new(
                        workspace_id.clone(),
                        session_id.clone(),
                        tab.title.clone(),
                    );
                    session.acp_session_id = tab.acp_session_id.clone();
                    session.agent_type = tab
                        .agent_id
                        .clone()
                        .or_else(|| Some(DEFAULT_AGENT_TYPE.to_string()));
                    session.worktree_path = worktree_path.map(|s| s.to_string());
                    session
                });
            return Ok(session.clone());
        }

        let (mut session, _) =
            self.create_session(workspace_id, session_id, "", None, idempotency_key)?;
        if let Some(worktree) = worktree_path {
            let mut records = self.inner.records.lock();
            if let Some(record) =
                records.sessions.get_mut(&Self::key(workspace_id, session_id))
            {
                record.worktree_path = Some(worktree.to_string());
                session = record.clone();
            }
        }
        Ok(session)
    }

    /// Look up the host for a session, creating (and starting) one when none
    /// exists. A host found in a terminal state is replaced.
    pub fn get_or_create_host(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
        ctx: HostSpawnContext,
    ) -> Result<Arc<SessionHost>, AcpError> {
        let key = Self::key(workspace_id, session_id);
        let mut hosts = self.inner.hosts.lock();

        if let Some(host) = hosts.get(&key) {
            match host.status() {
                HostStatus::Stopped | HostStatus::Suspended | HostStatus::Error => {
                    hosts.remove(&key);
                }
                _ => return Ok(Arc::clone(host)),
            }
        }

        let (previous_acp, agent_type, worktree_path) = {
            let records = self.inner.records.lock();
            let session = records.sessions.get(&key).ok_or(AcpError::NotFound)?;
            (
                session.acp_session_id.clone(),
                session
                    .agent_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AGENT_TYPE.to_string()),
                session.worktree_path.clone(),
            )
        };

        let weak = Arc::downgrade(&self.inner);
        let ws = workspace_id.clone();
        let sid = session_id.clone();
        let on_acp_session: Arc<dyn Fn(&str) + Send + Sync> = {
            let weak = weak.clone();
            let ws = ws.clone();
            let sid = sid.clone();
            Arc::new(move |acp_id: &str| {
                if let Some(inner) = weak.upgrade() {
                    persist_acp_session(&inner, &ws, &sid, acp_id);
                }
            })
        };
        let on_activity: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut records = inner.records.lock();
                if let Some(session) = records
                    .sessions
                    .get_mut(&(ws.as_str().to_string(), sid.as_str().to_string()))
                {
                    session.touch();
                }
            }
        });

        let params = HostParams {
            workspace_id: workspace_id.clone(),
            session_id: session_id.clone(),
            config: self.inner.config.clone(),
            message_buffer: self.inner.limits.acp_message_buffer_size,
            viewer_buffer: self.inner.limits.acp_viewer_send_buffer,
            events: Arc::clone(&self.inner.events),
            callbacks: HostCallbacks { on_activity, on_acp_session },
            previous_acp_session: previous_acp,
        };
        let spec = AgentSpawnSpec {
            workspace_id: workspace_id.as_str().to_string(),
            session_id: session_id.as_str().to_string(),
            agent_type,
            workdir: ctx.workdir,
            container: ctx.container,
            previous_acp_session: None,
            worktree_path,
        };

        let host = SessionHost::spawn(params, Arc::clone(&self.inner.launcher), spec);
        hosts.insert(key, Arc::clone(&host));
        Ok(host)
    }

    /// Count of running session records, for the heartbeat body.
    pub fn running_count(&self) -> usize {
        self.inner
            .records
            .lock()
            .sessions
            .values()
            .filter(|s| s.status == AgentSessionStatus::Running)
            .count()
    }

    /// Stop every host; used at daemon shutdown.
    pub async fn stop_all(&self) {
        let hosts: Vec<Arc<SessionHost>> =
            self.inner.hosts.lock().drain().map(|(_, h)| h).collect();
        for host in hosts {
            host.stop().await;
        }
    }

    /// Drop every record and host of one workspace (workspace deletion).
    pub async fn remove_workspace(&self, workspace_id: &WorkspaceId) {
        let hosts: Vec<Arc<SessionHost>> = {
            let mut hosts = self.inner.hosts.lock();
            let keys: Vec<SessionKey> = hosts
                .keys()
                .filter(|(ws, _)| ws == workspace_id.as_str())
                .cloned()
                .collect();
            keys.into_iter().filter_map(|k| hosts.remove(&k)).collect()
        };
        for host in hosts {
            host.stop().await;
        }
        let mut records = self.inner.records.lock();
        records.sessions.retain(|(ws, _), _| ws != workspace_id.as_str());
        records.idempotency.retain(|(ws, _), _| ws != workspace_id.as_str());
    }
}

fn persist_acp_session(
    inner: &Arc<AcpInner>,
    workspace_id: &WorkspaceId,
    session_id: &SessionId,
    acp_id: &str,
) {
    let agent_type = {
        let mut records = inner.records.lock();
        match records
            .sessions
            .get_mut(&(workspace_id.as_str().to_string(), session_id.as_str().to_string()))
        {
            Some(session) => {
                session.acp_session_id = Some(acp_id.to_string());
                session.touch();
                session.agent_type.clone()
            }
            None => None,
        }
    };
    if let Err(e) = inner.store.set_tab_acp_session(
        workspace_id.as_str(),
        session_id.as_str(),
        Some(acp_id),
        agent_type.as_deref(),
    ) {
        warn!(workspace_id = %workspace_id, error = %e, "tab acp persist failed");
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
