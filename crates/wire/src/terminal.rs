// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer WebSocket envelope.
//!
//! One socket carries every terminal of a workspace; messages are scoped by
//! `sessionId`. Output payloads are UTF-8 lossy text (the browser renders
//! through xterm.js, which tolerates replacement characters).

use serde::{Deserialize, Serialize};

/// Client → server terminal messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalClientMessage {
    /// Start a new PTY with a client-supplied session id.
    CreateSession {
        #[serde(rename = "sessionId")]
        session_id: String,
        rows: u16,
        cols: u16,
        #[serde(rename = "workDir", skip_serializing_if = "Option::is_none")]
        work_dir: Option<String>,
    },

    /// Reattach to a live (possibly orphaned) session and receive scrollback.
    ReattachSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// Keyboard input for one session.
    Input {
        #[serde(rename = "sessionId")]
        session_id: String,
        data: String,
    },

    /// Terminal geometry change.
    Resize {
        #[serde(rename = "sessionId")]
        session_id: String,
        rows: u16,
        cols: u16,
    },

    /// Terminate the process and remove the session.
    CloseSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// Rename the tab title.
    RenameSession {
        #[serde(rename = "sessionId")]
        session_id: String,
        name: String,
    },

    /// List this user's live sessions in the workspace.
    ListSessions,

    /// Keepalive; answered with `pong`, does not record activity.
    Ping,
}

/// Server → client terminal messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalServerMessage {
    SessionCreated {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    SessionReattached {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// Buffered output replayed at reattach, before any live `output`.
    Scrollback {
        #[serde(rename = "sessionId")]
        session_id: String,
        data: String,
    },

    Output {
        #[serde(rename = "sessionId")]
        session_id: String,
        data: String,
    },

    SessionClosed {
        #[serde(rename = "sessionId")]
        session_id: String,
        reason: String,
    },

    SessionRenamed {
        #[serde(rename = "sessionId")]
        session_id: String,
        name: String,
    },

    SessionList { sessions: Vec<TerminalSessionInfo> },

    Pong,

    Error {
        #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
    },
}

/// One entry in a `session_list` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSessionInfo {
    pub session_id: String,
    pub name: String,
    pub status: String,
    pub created_at: String,
    pub last_activity: String,
}
