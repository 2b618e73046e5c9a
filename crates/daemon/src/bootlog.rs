// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workspace boot-log broadcasters.
//!
//! Each broadcaster holds a bounded catch-up buffer of provisioning log
//! entries, a set of connected clients, and a sticky completion latch so
//! late joiners see the terminal `complete` immediately after catch-up.
//!
//! Clients are bounded channels into the WebSocket writer task; a client
//! whose channel is full or closed is dropped rather than blocking the
//! broadcaster. The per-write socket deadline lives in the writer task.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use sam_core::BootLogEntry;

/// Message delivered to a boot-log client channel.
#[derive(Debug, Clone, PartialEq)]
pub enum BootLogClientEvent {
    Entry(BootLogEntry),
    /// The broadcaster is done with this client; the socket should close.
    Close,
}

pub type BootLogClient = mpsc::Sender<BootLogClientEvent>;

struct BroadcasterState {
    entries: VecDeque<BootLogEntry>,
    clients: HashMap<u64, BootLogClient>,
    complete: bool,
    next_client: u64,
}

/// One workspace's boot-log fan-out.
pub struct BootLogBroadcaster {
    workspace_id: String,
    max_entries: usize,
    state: Mutex<BroadcasterState>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl BootLogBroadcaster {
    fn new(workspace_id: String, max_entries: usize) -> Self {
        Self {
            workspace_id,
            max_entries,
            state: Mutex::new(BroadcasterState {
                entries: VecDeque::new(),
                clients: HashMap::new(),
                complete: false,
                next_client: 0,
            }),
        }
    }

    /// Append a log entry and fan it out to every connected client.
    pub fn broadcast(&self, step: &str, status: &str, message: &str, detail: serde_json::Value) {
        let entry = BootLogEntry {
            entry_type: sam_core::BootLogEntryType::Log,
            step: step.to_string(),
            status: status.to_string(),
            message: message.to_string(),
            detail,
            timestamp: now_rfc3339(),
        };

        let mut state = self.state.lock();
        state.entries.push_back(entry.clone());
        while state.entries.len() > self.max_entries {
            state.entries.pop_front();
        }
        self.fan_out(&mut state, BootLogClientEvent::Entry(entry));
    }

    /// Register a client. Buffered entries are copied under the lock and
    /// queued to the new client before any live entry can interleave. If the
    /// latch is already set, the client receives catch-up plus `complete`
    /// and is closed without being registered.
    pub fn add_client(&self, client: BootLogClient) {
        let (buffered, complete) = {
            let mut state = self.state.lock();
            let buffered: Vec<BootLogEntry> = state.entries.iter().cloned().collect();
            if !state.complete {
                let id = state.next_client;
                state.next_client += 1;
                state.clients.insert(id, client.clone());
            }
            (buffered, state.complete)
        };

        for entry in buffered {
            if client.try_send(BootLogClientEvent::Entry(entry)).is_err() {
                return;
            }
        }
        if complete {
            let _ = client.try_send(BootLogClientEvent::Entry(BootLogEntry::complete(
                now_rfc3339(),
            )));
            let _ = client.try_send(BootLogClientEvent::Close);
        }
    }

    /// Set the sticky completion latch and fan out `{type:"complete"}`.
    pub fn mark_complete(&self) {
        let mut state = self.state.lock();
        if state.complete {
            return;
        }
        state.complete = true;
        debug!(workspace_id = %self.workspace_id, "boot log complete");
        self.fan_out(&mut state, BootLogClientEvent::Entry(BootLogEntry::complete(now_rfc3339())));
    }

    /// Whether the completion latch is set.
    pub fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    /// Snapshot of the buffered entries (for tests and diagnostics).
    pub fn buffered(&self) -> Vec<BootLogEntry> {
        self.state.lock().entries.iter().cloned().collect()
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    fn fan_out(&self, state: &mut BroadcasterState, event: BootLogClientEvent) {
        state.clients.retain(|_, client| {
            if client.try_send(event.clone()).is_err() {
                let _ = client.try_send(BootLogClientEvent::Close);
                false
            } else {
                true
            }
        });
    }
}

/// Registry of broadcasters keyed by workspace id.
pub struct BootLogManager {
    max_entries: usize,
    inner: Mutex<HashMap<String, Arc<BootLogBroadcaster>>>,
}

impl BootLogManager {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries, inner: Mutex::new(HashMap::new()) }
    }

    pub fn get_or_create(&self, workspace_id: &str) -> Arc<BootLogBroadcaster> {
        let mut inner = self.inner.lock();
        Arc::clone(inner.entry(workspace_id.to_string()).or_insert_with(|| {
            Arc::new(BootLogBroadcaster::new(workspace_id.to_string(), self.max_entries))
        }))
    }

    pub fn get(&self, workspace_id: &str) -> Option<Arc<BootLogBroadcaster>> {
        self.inner.lock().get(workspace_id).cloned()
    }

    /// Reclaim a workspace's broadcaster after provisioning settles.
    pub fn remove(&self, workspace_id: &str) {
        self.inner.lock().remove(workspace_id);
    }
}

#[cfg(test)]
#[path = "bootlog_tests.rs"]
mod tests;
