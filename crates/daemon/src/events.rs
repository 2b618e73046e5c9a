// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded audit event rings, node-wide and per-workspace.
//!
//! Events live only for the process lifetime. Each ring is strictly FIFO
//! with newest first; there is no ordering between workspaces.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use sam_core::{EventLevel, EventRecord, Limits};

/// Sink for audit events, passed down to subsystems that emit them.
pub trait EventAppender: Send + Sync {
    fn append(
        &self,
        workspace_id: Option<&str>,
        level: EventLevel,
        kind: &str,
        message: &str,
        detail: serde_json::Value,
    );
}

struct Rings {
    node: VecDeque<EventRecord>,
    per_workspace: HashMap<String, VecDeque<EventRecord>>,
}

/// The node's event log: one node-wide ring plus one ring per workspace.
pub struct EventLog {
    node_id: String,
    limits: Limits,
    rings: Mutex<Rings>,
}

/// Default page size for event reads.
pub const DEFAULT_EVENT_LIMIT: usize = 100;
/// Hard cap for `?limit=`.
pub const MAX_EVENT_LIMIT: usize = 500;

/// Clamp a `?limit=` query value into the permitted range.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT)
}

fn random_event_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

impl EventLog {
    pub fn new(node_id: impl Into<String>, limits: Limits) -> Arc<Self> {
        Arc::new(Self {
            node_id: node_id.into(),
            limits,
            rings: Mutex::new(Rings { node: VecDeque::new(), per_workspace: HashMap::new() }),
        })
    }

    /// Prepend an event to the node ring and, when `workspace_id` is set,
    /// to that workspace's ring.
    pub fn append_node_event(
        &self,
        workspace_id: Option<&str>,
        level: EventLevel,
        kind: &str,
        message: &str,
        detail: serde_json::Value,
    ) {
        let record = EventRecord {
            id: random_event_id(),
            node_id: Some(self.node_id.clone()),
            workspace_id: workspace_id.map(|s| s.to_string()),
            level,
            kind: kind.to_string(),
            message: message.to_string(),
            detail,
            created_at: Utc::now(),
        };

        let mut rings = self.rings.lock();
        rings.node.push_front(record.clone());
        rings.node.truncate(self.limits.max_node_events);

        if let Some(ws) = workspace_id.filter(|w| !w.is_empty()) {
            let ring = rings.per_workspace.entry(ws.to_string()).or_default();
            ring.push_front(record);
            ring.truncate(self.limits.max_workspace_events);
        }
    }

    /// Newest-first node events, up to `limit`.
    pub fn node_events(&self, limit: usize) -> Vec<EventRecord> {
        let rings = self.rings.lock();
        rings.node.iter().take(limit).cloned().collect()
    }

    /// Newest-first events for one workspace, up to `limit`.
    pub fn workspace_events(&self, workspace_id: &str, limit: usize) -> Vec<EventRecord> {
        let rings = self.rings.lock();
        rings
            .per_workspace
            .get(workspace_id)
            .map(|ring| ring.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a workspace's ring when the workspace is deleted.
    pub fn remove_workspace(&self, workspace_id: &str) {
        self.rings.lock().per_workspace.remove(workspace_id);
    }
}

impl EventAppender for EventLog {
    fn append(
        &self,
        workspace_id: Option<&str>,
        level: EventLevel,
        kind: &str,
        message: &str,
        detail: serde_json::Value,
    ) {
        self.append_node_event(workspace_id, level, kind, message, detail);
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
