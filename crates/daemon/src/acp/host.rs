// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session host: owns one agent child process and fans its message stream
//! out to N viewers.
//!
//! The host's lifetime is decoupled from any viewer's WebSocket. Viewers
//! attach with a bounded send queue; on attach the current message log is
//! snapshotted under the host mutex and enqueued before any live message,
//! so every viewer sees a prefix of the log followed by the live tail. A
//! viewer whose queue is full is dropped rather than blocking the host.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sam_core::{EventLevel, SessionId, WorkspaceId};
use sam_wire::AgentServerMessage;

use crate::acp::launcher::{
    AgentLauncher, AgentMessage, AgentMessageKind, AgentSpawnSpec,
};
use crate::config::AcpConfig;
use crate::events::EventAppender;

/// Host state machine. `Stopped` and `Suspended` are terminal for the host;
/// the session record may outlive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Idle,
    Starting,
    Ready,
    Prompting,
    Error,
    Stopped,
    Suspended,
}

sam_core::simple_display! {
    HostStatus {
        Idle => "idle",
        Starting => "starting",
        Ready => "ready",
        Prompting => "prompting",
        Error => "error",
        Stopped => "stopped",
        Suspended => "suspended",
    }
}

/// Errors from host operations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("session_not_running")]
    NotRunning,

    #[error("viewer send queue rejected attach")]
    ViewerRejected,

    #[error(transparent)]
    Agent(#[from] crate::acp::launcher::AgentError),
}

/// Outcome of submitting a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Started,
    /// The host was already prompting; the submission was skipped.
    DuplicateSkipped,
}

/// Back-references into the daemon, passed down at construction.
/// The host never owns the server; these are callback seams.
#[derive(Clone)]
pub struct HostCallbacks {
    /// Fired on every agent message (activity tracking).
    pub on_activity: Arc<dyn Fn() + Send + Sync>,
    /// Persist the agent-side session id as soon as it is known.
    pub on_acp_session: Arc<dyn Fn(&str) + Send + Sync>,
}

impl HostCallbacks {
    pub fn noop() -> Self {
        Self { on_activity: Arc::new(|| {}), on_acp_session: Arc::new(|_| {}) }
    }
}

struct Viewer {
    tx: mpsc::Sender<AgentServerMessage>,
}

struct HostInner {
    status: HostStatus,
    viewers: HashMap<u64, Viewer>,
    next_viewer: u64,
    log: VecDeque<serde_json::Value>,
    acp_session_id: Option<String>,
    commands: Option<crate::acp::launcher::AgentCommands>,
    restart_budget: u32,
    prompt_epoch: u64,
}

/// Construction parameters for a host.
pub struct HostParams {
    pub workspace_id: WorkspaceId,
    pub session_id: SessionId,
    pub config: AcpConfig,
    pub message_buffer: usize,
    pub viewer_buffer: usize,
    pub events: Arc<dyn EventAppender>,
    pub callbacks: HostCallbacks,
    pub previous_acp_session: Option<String>,
}

/// Runtime container of one agent session's process and replay buffer.
pub struct SessionHost {
    pub workspace_id: WorkspaceId,
    pub session_id: SessionId,
    config: AcpConfig,
    message_buffer: usize,
    viewer_buffer: usize,
    events: Arc<dyn EventAppender>,
    callbacks: HostCallbacks,
    inner: Mutex<HostInner>,
    status_tx: watch::Sender<HostStatus>,
    cancel: CancellationToken,
    weak_self: Weak<SessionHost>,
}

impl SessionHost {
    /// Create the host and start its agent process in the background.
    pub fn spawn(
        params: HostParams,
        launcher: Arc<dyn AgentLauncher>,
        spec: AgentSpawnSpec,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(HostStatus::Starting);
        let restart_budget = params.config.restart_budget;
        let host = Arc::new_cyclic(|weak| Self {
            workspace_id: params.workspace_id,
            session_id: params.session_id,
            config: params.config,
            message_buffer: params.message_buffer,
            viewer_buffer: params.viewer_buffer,
            events: params.events,
            callbacks: params.callbacks,
            inner: Mutex::new(HostInner {
                status: HostStatus::Starting,
                viewers: HashMap::new(),
                next_viewer: 0,
                log: VecDeque::new(),
                acp_session_id: params.previous_acp_session,
                commands: None,
                restart_budget,
                prompt_epoch: 0,
            }),
            status_tx,
            cancel: CancellationToken::new(),
            weak_self: weak.clone(),
        });

        tokio::spawn(Self::run(Arc::clone(&host), launcher, spec));
        host
    }

    /// Buffer size used for viewer send queues.
    pub fn viewer_buffer(&self) -> usize {
        self.viewer_buffer
    }

    async fn run(host: Arc<Self>, launcher: Arc<dyn AgentLauncher>, mut spec: AgentSpawnSpec) {
        loop {
            spec.previous_acp_session = host.inner.lock().acp_session_id.clone();

            let handle = match launcher.launch(spec.clone()).await {
                Ok(handle) => handle,
                Err(e) => {
                    host.enter_error(&format!("agent launch failed: {e}"));
                    return;
                }
            };

            {
                let mut inner = host.inner.lock();
                inner.acp_session_id = Some(handle.acp_session_id.clone());
                inner.commands = Some(handle.commands.clone());
                host.set_status_locked(&mut inner, HostStatus::Ready);
            }
            (host.callbacks.on_acp_session)(&handle.acp_session_id);
            info!(
                workspace_id = %host.workspace_id,
                session_id = %host.session_id,
                acp_session_id = %handle.acp_session_id,
                "agent session ready"
            );

            let mut messages = handle.messages;
            loop {
                tokio::select! {
                    _ = host.cancel.cancelled() => return,
                    msg = messages.recv() => match msg {
                        Some(msg) => host.handle_message(msg),
                        None => break,
                    }
                }
            }

            match host.status() {
                HostStatus::Stopped | HostStatus::Suspended => return,
                _ => {}
            }

            let restarting = {
                let mut inner = host.inner.lock();
                if inner.restart_budget > 0 {
                    inner.restart_budget -= 1;
                    true
                } else {
                    false
                }
            };
            if restarting {
                warn!(
                    workspace_id = %host.workspace_id,
                    session_id = %host.session_id,
                    "agent process exited, restarting"
                );
                host.events.append(
                    Some(host.workspace_id.as_str()),
                    EventLevel::Warn,
                    "agent.restarted",
                    "agent process exited unexpectedly, restarting",
                    serde_json::Value::Null,
                );
                continue;
            }

            host.enter_error("agent process exited");
            return;
        }
    }

    fn handle_message(&self, msg: AgentMessage) {
        {
            let mut inner = self.inner.lock();
            inner.log.push_back(msg.payload.clone());
            while inner.log.len() > self.message_buffer {
                inner.log.pop_front();
            }
            Self::fan_out(&mut inner, AgentServerMessage::Message { payload: msg.payload });
            if msg.kind == AgentMessageKind::TurnEnded && inner.status == HostStatus::Prompting {
                self.set_status_locked(&mut inner, HostStatus::Ready);
            }
        }
        (self.callbacks.on_activity)();
    }

    /// Attach a viewer. The message log is snapshotted and queued under the
    /// host mutex, ahead of any live message. Fails when the host is not
    /// ready or prompting.
    pub fn attach_viewer(
        &self,
        tx: mpsc::Sender<AgentServerMessage>,
    ) -> Result<u64, HostError> {
        let mut inner = self.inner.lock();
        if !matches!(inner.status, HostStatus::Ready | HostStatus::Prompting) {
            return Err(HostError::NotRunning);
        }
        let snapshot: Vec<serde_json::Value> = inner.log.iter().cloned().collect();
        if tx.try_send(AgentServerMessage::Replay { messages: snapshot }).is_err() {
            return Err(HostError::ViewerRejected);
        }
        let id = inner.next_viewer;
        inner.next_viewer += 1;
        inner.viewers.insert(id, Viewer { tx });
        debug!(session_id = %self.session_id, viewer = id, "viewer attached");
        Ok(id)
    }

    /// Remove a viewer without affecting others or the host.
    pub fn detach_viewer(&self, viewer_id: u64) {
        self.inner.lock().viewers.remove(&viewer_id);
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.lock().viewers.len()
    }

    pub fn status(&self) -> HostStatus {
        self.inner.lock().status
    }

    pub fn acp_session_id(&self) -> Option<String> {
        self.inner.lock().acp_session_id.clone()
    }

    /// Wait for the startup handshake to settle.
    pub async fn wait_ready(&self, timeout: std::time::Duration) -> Result<(), HostError> {
        let mut rx = self.status_tx.subscribe();
        let wait = async {
            loop {
                match *rx.borrow_and_update() {
                    HostStatus::Ready | HostStatus::Prompting => return Ok(()),
                    HostStatus::Error | HostStatus::Stopped | HostStatus::Suspended => {
                        return Err(HostError::NotRunning)
                    }
                    HostStatus::Idle | HostStatus::Starting => {}
                }
                if rx.changed().await.is_err() {
                    return Err(HostError::NotRunning);
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| HostError::NotRunning)?
    }

    /// Submit a prompt. A duplicate while already prompting is skipped.
    pub async fn prompt(&self, text: &str) -> Result<PromptOutcome, HostError> {
        let (commands, epoch) = {
            let mut inner = self.inner.lock();
            match inner.status {
                HostStatus::Prompting => {
                    info!(session_id = %self.session_id, "skipping duplicate prompt");
                    return Ok(PromptOutcome::DuplicateSkipped);
                }
                HostStatus::Ready => {}
                _ => return Err(HostError::NotRunning),
            }
            let user_msg = serde_json::json!({"type": "user_message", "text": text});
            inner.log.push_back(user_msg.clone());
            while inner.log.len() > self.message_buffer {
                inner.log.pop_front();
            }
            Self::fan_out(&mut inner, AgentServerMessage::Message { payload: user_msg });
            inner.prompt_epoch += 1;
            self.set_status_locked(&mut inner, HostStatus::Prompting);
            (inner.commands.clone(), inner.prompt_epoch)
        };
        let commands = commands.ok_or(HostError::NotRunning)?;
        commands.prompt(text).await?;

        // Watchdog: force the turn back to ready if the agent never ends it.
        let weak = self.weak_self.clone();
        let timeout = self.config.prompt_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(host) = weak.upgrade() {
                host.expire_prompt(epoch, "prompt timed out");
            }
        });
        Ok(PromptOutcome::Started)
    }

    /// Cancel the in-flight prompt. After the grace period the host returns
    /// to ready even if the agent never acknowledged.
    pub async fn cancel(&self) -> Result<(), HostError> {
        let (commands, epoch) = {
            let inner = self.inner.lock();
            (inner.commands.clone(), inner.prompt_epoch)
        };
        commands.ok_or(HostError::NotRunning)?.cancel().await?;

        let weak = self.weak_self.clone();
        let grace = self.config.prompt_cancel_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(host) = weak.upgrade() {
                host.expire_prompt(epoch, "prompt cancelled");
            }
        });
        Ok(())
    }

    fn expire_prompt(&self, epoch: u64, reason: &str) {
        let expired = {
            let mut inner = self.inner.lock();
            if inner.status == HostStatus::Prompting && inner.prompt_epoch == epoch {
                self.set_status_locked(&mut inner, HostStatus::Ready);
                true
            } else {
                false
            }
        };
        if expired {
            warn!(session_id = %self.session_id, reason, "prompt expired");
            self.events.append(
                Some(self.workspace_id.as_str()),
                EventLevel::Warn,
                "agent.prompt_expired",
                reason,
                serde_json::Value::Null,
            );
        }
    }

    /// Stop the child but keep the agent-side session id so a later attach
    /// can resume the conversation. Returns the preserved id.
    pub async fn suspend(&self) -> Option<String> {
        self.shutdown(HostStatus::Suspended).await
    }

    /// Stop the child for good.
    pub async fn stop(&self) -> Option<String> {
        self.shutdown(HostStatus::Stopped).await
    }

    async fn shutdown(&self, terminal: HostStatus) -> Option<String> {
        let (commands, acp_session_id) = {
            let mut inner = self.inner.lock();
            self.set_status_locked(&mut inner, terminal);
            (inner.commands.take(), inner.acp_session_id.clone())
        };
        if let Some(commands) = commands {
            commands.kill().await;
        }
        self.cancel.cancel();
        acp_session_id
    }

    fn enter_error(&self, message: &str) {
        {
            let mut inner = self.inner.lock();
            self.set_status_locked(&mut inner, HostStatus::Error);
        }
        warn!(
            workspace_id = %self.workspace_id,
            session_id = %self.session_id,
            message,
            "agent session error"
        );
        self.events.append(
            Some(self.workspace_id.as_str()),
            EventLevel::Error,
            "agent.session_error",
            message,
            serde_json::Value::Null,
        );
    }

    fn set_status_locked(&self, inner: &mut HostInner, status: HostStatus) {
        inner.status = status;
        let _ = self.status_tx.send_replace(status);
        Self::fan_out(inner, AgentServerMessage::SessionStatus { status: status.to_string() });
    }

    /// Enqueue to every viewer; a viewer with a full or closed queue is
    /// dropped so it can never block the host or its peers.
    fn fan_out(inner: &mut HostInner, msg: AgentServerMessage) {
        inner.viewers.retain(|id, viewer| {
            if viewer.tx.try_send(msg.clone()).is_err() {
                debug!(viewer = *id, "dropping slow viewer");
                false
            } else {
                true
            }
        });
    }
}
