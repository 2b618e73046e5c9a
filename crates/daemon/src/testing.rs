// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes and helpers for the daemon's own tests and the workspace-level
//! integration specs.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::acp::{
    AgentCommand, AgentCommands, AgentError, AgentHandle, AgentLauncher, AgentMessage,
    AgentSpawnSpec,
};
use crate::callbacks::{CallbackError, ControlPlane, HeartbeatBody};
use crate::provisioner::{
    ContainerError, ContainerResolver, ProvisionConfig, ProvisionError, ProvisionReporter,
    ResolvedContainer, WorkspaceProvisioner,
};

/// Issue an HS256 JWT for tests.
pub fn make_jwt(secret: &str, sub: &str, workspace: Option<&str>) -> String {
    let claims = crate::auth::Claims {
        sub: Some(sub.to_string()),
        workspace: workspace.map(|w| w.to_string()),
        exp: (chrono::Utc::now().timestamp() as u64) + 3600,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

/// Agent launcher whose child echoes prompts and ends each turn.
///
/// A fresh launch mints `acp-<n>`; a launch with a previous session id
/// returns that id, mirroring an agent-side session load.
pub struct ScriptedAgentLauncher {
    state: Mutex<ScriptState>,
    fail_with: Option<String>,
}

struct ScriptState {
    counter: u64,
    launches: Vec<AgentSpawnSpec>,
}

impl ScriptedAgentLauncher {
    pub fn new() -> Self {
        Self { state: Mutex::new(ScriptState { counter: 0, launches: Vec::new() }), fail_with: None }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            state: Mutex::new(ScriptState { counter: 0, launches: Vec::new() }),
            fail_with: Some(message.to_string()),
        }
    }

    /// Specs recorded by every launch, in order.
    pub fn launches(&self) -> Vec<AgentSpawnSpec> {
        self.state.lock().launches.clone()
    }
}

impl Default for ScriptedAgentLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentLauncher for ScriptedAgentLauncher {
    async fn launch(&self, spec: AgentSpawnSpec) -> Result<AgentHandle, AgentError> {
        if let Some(message) = &self.fail_with {
            return Err(AgentError::Spawn(message.clone()));
        }

        let acp_session_id = {
            let mut state = self.state.lock();
            state.launches.push(spec.clone());
            match &spec.previous_acp_session {
                Some(previous) => previous.clone(),
                None => {
                    state.counter += 1;
                    format!("acp-{}", state.counter)
                }
            }
        };

        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let (msg_tx, msg_rx) = mpsc::channel(256);
        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                match command {
                    AgentCommand::Prompt(text) => {
                        let echo = serde_json::json!({
                            "type": "agent_message",
                            "text": format!("echo: {text}"),
                        });
                        if msg_tx.send(AgentMessage::from_payload(echo)).await.is_err() {
                            break;
                        }
                        let done = serde_json::json!({
                            "type": "result",
                            "stopReason": "end_turn",
                        });
                        if msg_tx.send(AgentMessage::from_payload(done)).await.is_err() {
                            break;
                        }
                    }
                    AgentCommand::Cancel => {
                        let done = serde_json::json!({
                            "type": "result",
                            "stopReason": "cancelled",
                        });
                        if msg_tx.send(AgentMessage::from_payload(done)).await.is_err() {
                            break;
                        }
                    }
                    AgentCommand::Kill => break,
                }
            }
        });

        Ok(AgentHandle {
            acp_session_id,
            commands: AgentCommands::from_sender(cmd_tx),
            messages: msg_rx,
        })
    }
}

/// Provisioner fake: scripted results, recorded configs.
pub struct FakeProvisioner {
    results: Mutex<VecDeque<Result<bool, String>>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ProvisionConfig>>,
}

impl FakeProvisioner {
    /// Always succeeds; `recovery` selects the devcontainer-fallback result.
    pub fn succeeding(recovery: bool) -> Self {
        Self::scripted(vec![Ok(recovery)])
    }

    pub fn failing(message: &str) -> Self {
        Self::scripted(vec![Err(message.to_string())])
    }

    /// Consume `results` in order; the last one repeats.
    pub fn scripted(results: Vec<Result<bool, String>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ProvisionConfig> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl WorkspaceProvisioner for FakeProvisioner {
    async fn prepare_workspace(
        &self,
        cfg: &ProvisionConfig,
        reporter: &dyn ProvisionReporter,
    ) -> Result<bool, ProvisionError> {
        self.calls.lock().push(cfg.clone());
        reporter.report("clone", "running", "cloning repository", serde_json::Value::Null);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reporter.report("clone", "done", "repository ready", serde_json::Value::Null);

        let result = {
            let mut results = self.results.lock();
            if results.len() > 1 {
                results.pop_front()
            } else {
                results.front().cloned()
            }
        };
        match result {
            Some(Ok(recovery)) => Ok(recovery),
            Some(Err(message)) => Err(ProvisionError::Failed(message)),
            None => Ok(false),
        }
    }

    async fn remove_volume(&self, _workspace_id: &str) -> Result<(), ProvisionError> {
        Ok(())
    }
}

/// Control plane fake recording every outbound call.
#[derive(Default)]
pub struct RecordingControlPlane {
    pub git_token: Option<String>,
    failed: Mutex<Vec<(String, String, Option<String>)>>,
    heartbeats: Mutex<Vec<HeartbeatBody>>,
    ready: Mutex<usize>,
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_git_token(token: &str) -> Self {
        Self { git_token: Some(token.to_string()), ..Self::default() }
    }

    /// `(workspace_id, error_message, bearer)` per provisioning-failed call.
    pub fn failed_calls(&self) -> Vec<(String, String, Option<String>)> {
        self.failed.lock().clone()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.lock().len()
    }

    pub fn ready_count(&self) -> usize {
        *self.ready.lock()
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn node_ready(&self) -> Result<(), CallbackError> {
        *self.ready.lock() += 1;
        Ok(())
    }

    async fn heartbeat(&self, body: &HeartbeatBody) -> Result<(), CallbackError> {
        self.heartbeats.lock().push(body.clone());
        Ok(())
    }

    async fn provisioning_failed(
        &self,
        workspace_id: &str,
        error_message: &str,
        token_override: Option<&str>,
    ) -> Result<(), CallbackError> {
        self.failed.lock().push((
            workspace_id.to_string(),
            error_message.to_string(),
            token_override.map(|t| t.to_string()),
        ));
        Ok(())
    }

    async fn fetch_git_token(
        &self,
        _workspace_id: &str,
        _token_override: Option<&str>,
    ) -> Result<Option<String>, CallbackError> {
        Ok(self.git_token.clone())
    }

    async fn fetch_runtime_assets(
        &self,
        _token_override: Option<&str>,
    ) -> Result<serde_json::Value, CallbackError> {
        Ok(serde_json::json!({}))
    }
}

/// Container resolver fake.
pub struct StaticContainerResolver {
    result: ResolverBehavior,
}

pub enum ResolverBehavior {
    Resolved(ResolvedContainer),
    Unavailable,
    NoContainer,
}

impl StaticContainerResolver {
    pub fn resolved(container: ResolvedContainer) -> Arc<Self> {
        Arc::new(Self { result: ResolverBehavior::Resolved(container) })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self { result: ResolverBehavior::Unavailable })
    }

    /// Host mode: nothing to resolve.
    pub fn none() -> Arc<Self> {
        Arc::new(Self { result: ResolverBehavior::NoContainer })
    }
}

#[async_trait]
impl ContainerResolver for StaticContainerResolver {
    async fn resolve(&self, container_label: &str) -> Result<ResolvedContainer, ContainerError> {
        match &self.result {
            ResolverBehavior::Resolved(container) => Ok(container.clone()),
            ResolverBehavior::Unavailable => {
                Err(ContainerError::Unavailable("daemon unreachable".to_string()))
            }
            ResolverBehavior::NoContainer => {
                Err(ContainerError::NotRunning(container_label.to_string()))
            }
        }
    }
}
