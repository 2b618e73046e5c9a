// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent child process launching.
//!
//! The wire protocol to the child agent is external to the daemon; this
//! module pins down only the seam the session host needs: spawn a child for
//! an agent type, perform the initialize (or load-session) handshake, and
//! hand back a command sender plus an ordered message stream. The default
//! implementation frames JSON lines over the child's stdio.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::provisioner::ResolvedContainer;

/// Errors from agent process handling.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent spawn failed: {0}")]
    Spawn(String),

    #[error("agent initialize timed out")]
    InitTimeout,

    #[error("agent protocol error: {0}")]
    Protocol(String),

    #[error("agent process closed")]
    Closed,
}

/// Everything needed to spawn one agent child process.
#[derive(Debug, Clone)]
pub struct AgentSpawnSpec {
    pub workspace_id: String,
    pub session_id: String,
    pub agent_type: String,
    pub workdir: String,
    pub container: Option<ResolvedContainer>,
    /// Agent-side session id from a previous run; triggers a session load
    /// instead of a fresh conversation.
    pub previous_acp_session: Option<String>,
    pub worktree_path: Option<String>,
}

/// How the host interprets one outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMessageKind {
    /// Ordinary update; replayed to viewers verbatim.
    Update,
    /// The agent finished the current turn.
    TurnEnded,
}

/// One message from the child agent.
#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub payload: serde_json::Value,
    pub kind: AgentMessageKind,
}

impl AgentMessage {
    /// Classify a raw payload. A `result` message or any payload carrying a
    /// `stopReason` ends the turn; everything else is an update.
    pub fn from_payload(payload: serde_json::Value) -> Self {
        let turn_ended = payload.get("type").and_then(|t| t.as_str()) == Some("result")
            || payload.get("stopReason").is_some();
        let kind = if turn_ended { AgentMessageKind::TurnEnded } else { AgentMessageKind::Update };
        Self { payload, kind }
    }
}

pub(crate) enum AgentCommand {
    Prompt(String),
    Cancel,
    Kill,
}

/// Clonable command side of a launched agent.
#[derive(Clone)]
pub struct AgentCommands {
    tx: mpsc::Sender<AgentCommand>,
}

impl AgentCommands {
    #[cfg(any(test, feature = "test-support"))]
    pub(crate) fn from_sender(tx: mpsc::Sender<AgentCommand>) -> Self {
        Self { tx }
    }

    pub async fn prompt(&self, text: &str) -> Result<(), AgentError> {
        self.tx
            .send(AgentCommand::Prompt(text.to_string()))
            .await
            .map_err(|_| AgentError::Closed)
    }

    pub async fn cancel(&self) -> Result<(), AgentError> {
        self.tx.send(AgentCommand::Cancel).await.map_err(|_| AgentError::Closed)
    }

    pub async fn kill(&self) {
        let _ = self.tx.send(AgentCommand::Kill).await;
    }
}

/// A launched agent: its session id, command sender, and message stream.
pub struct AgentHandle {
    pub acp_session_id: String,
    pub commands: AgentCommands,
    pub messages: mpsc::Receiver<AgentMessage>,
}

/// Seam between the session host and the agent process machinery.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, spec: AgentSpawnSpec) -> Result<AgentHandle, AgentError>;
}

/// Launches the agent as a child process speaking JSON lines over stdio.
/// In container mode the child runs inside the workspace devcontainer.
pub struct StdioAgentLauncher {
    init_timeout: std::time::Duration,
}

impl StdioAgentLauncher {
    pub fn new(init_timeout: std::time::Duration) -> Self {
        Self { init_timeout }
    }

    fn build_command(spec: &AgentSpawnSpec) -> Command {
        match &spec.container {
            Some(container) => {
                let mut cmd = Command::new("docker");
                cmd.arg("exec").arg("-i");
                cmd.arg("-w").arg(if spec.workdir.is_empty() {
                    container.workdir.as_str()
                } else {
                    spec.workdir.as_str()
                });
                if !container.user.is_empty() {
                    cmd.arg("-u").arg(&container.user);
                }
                cmd.arg(&container.container_id);
                cmd.arg(&spec.agent_type);
                cmd
            }
            None => {
                let mut cmd = Command::new(&spec.agent_type);
                if !spec.workdir.is_empty() {
                    cmd.current_dir(&spec.workdir);
                }
                cmd
            }
        }
    }
}

#[async_trait]
impl AgentLauncher for StdioAgentLauncher {
    async fn launch(&self, spec: AgentSpawnSpec) -> Result<AgentHandle, AgentError> {
        let mut cmd = Self::build_command(&spec);
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| AgentError::Spawn(e.to_string()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Spawn("agent stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Spawn("agent stdout unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        // Initialize handshake: a fresh session or a load of the previous one.
        let init = match &spec.previous_acp_session {
            Some(previous) => serde_json::json!({
                "type": "initialize",
                "loadSession": previous,
                "cwd": spec.workdir,
            }),
            None => serde_json::json!({"type": "initialize", "cwd": spec.workdir}),
        };
        let mut line = init.to_string();
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::Protocol(e.to_string()))?;

        let acp_session_id = tokio::time::timeout(self.init_timeout, async {
            loop {
                let raw = lines
                    .next_line()
                    .await
                    .map_err(|e| AgentError::Protocol(e.to_string()))?
                    .ok_or(AgentError::Closed)?;
                let value: serde_json::Value = match serde_json::from_str(&raw) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if value.get("type").and_then(|t| t.as_str()) == Some("initialized") {
                    let sid = value
                        .get("sessionId")
                        .and_then(|s| s.as_str())
                        .ok_or_else(|| {
                            AgentError::Protocol("initialized without sessionId".to_string())
                        })?;
                    return Ok::<String, AgentError>(sid.to_string());
                }
            }
        })
        .await
        .map_err(|_| AgentError::InitTimeout)??;

        debug!(
            workspace_id = %spec.workspace_id,
            session_id = %spec.session_id,
            acp_session_id = %acp_session_id,
            "agent initialized"
        );

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<AgentCommand>(16);
        let (msg_tx, msg_rx) = mpsc::channel::<AgentMessage>(256);

        let child = Arc::new(Mutex::new(child));
        let writer_child = Arc::clone(&child);
        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                match command {
                    AgentCommand::Prompt(text) => {
                        let payload = serde_json::json!({"type": "prompt", "text": text});
                        let mut line = payload.to_string();
                        line.push('\n');
                        if stdin.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    AgentCommand::Cancel => {
                        let mut line = serde_json::json!({"type": "cancel"}).to_string();
                        line.push('\n');
                        if stdin.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    AgentCommand::Kill => {
                        let mut guard = writer_child.lock().await;
                        if let Err(e) = guard.kill().await {
                            warn!(error = %e, "agent kill failed");
                        }
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Ok(Some(raw)) = lines.next_line().await {
                let value: serde_json::Value = match serde_json::from_str(&raw) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if msg_tx.send(AgentMessage::from_payload(value)).await.is_err() {
                    break;
                }
            }
            // Receiver drop signals EOF to the host.
            let mut guard = child.lock().await;
            let _ = guard.wait().await;
        });

        Ok(AgentHandle { acp_session_id, commands: AgentCommands { tx: cmd_tx }, messages: msg_rx })
    }
}
