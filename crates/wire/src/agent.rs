// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent (ACP) viewer WebSocket envelope.
//!
//! The viewer-facing side only: prompts and cancels travel up, agent
//! messages fan out down. Agent messages are opaque JSON values produced by
//! the child process; the daemon replays and forwards them without
//! interpreting their payloads.

use serde::{Deserialize, Serialize};

/// Client (viewer) → server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentClientMessage {
    /// Submit a user prompt to the agent.
    Prompt { text: String },

    /// Cancel the in-flight prompt.
    Cancel,

    /// Keepalive.
    Ping,
}

/// Server → client (viewer) messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentServerMessage {
    /// Replay of the buffered message log, delivered on attach before any
    /// live message.
    Replay { messages: Vec<serde_json::Value> },

    /// One live agent message.
    Message { payload: serde_json::Value },

    /// Host status change (ready, prompting, error, stopped, suspended).
    SessionStatus { status: String },

    Pong,

    Error {
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl AgentServerMessage {
    /// Conflict error sent when attaching to a session that is not running.
    pub fn session_not_running() -> Self {
        Self::Error { code: "session_not_running".to_string(), message: None }
    }
}
