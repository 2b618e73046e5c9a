// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buffer and ring capacity limits shared across subsystems.

use serde::{Deserialize, Serialize};

/// Capacity limits for the daemon's bounded buffers.
///
/// Every fan-out and replay buffer in the daemon is bounded; these are the
/// caps. All fields have serde defaults so a partial config overrides only
/// what it names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    /// Node-wide event ring capacity.
    pub max_node_events: usize,
    /// Per-workspace event ring capacity.
    pub max_workspace_events: usize,
    /// Per-workspace boot-log catch-up buffer capacity (entries).
    pub max_boot_log_entries: usize,
    /// Per-PTY-session output ring capacity (bytes).
    pub pty_output_buffer_size: usize,
    /// Per-agent-session message replay log capacity (messages).
    pub acp_message_buffer_size: usize,
    /// Per-viewer send queue capacity (messages).
    pub acp_viewer_send_buffer: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_node_events: 1000,
            max_workspace_events: 200,
            max_boot_log_entries: 500,
            pty_output_buffer_size: 256 * 1024,
            acp_message_buffer_size: 1000,
            acp_viewer_send_buffer: 256,
        }
    }
}
