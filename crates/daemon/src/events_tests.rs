// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use sam_core::{EventLevel, Limits};
use serde_json::json;

use super::{clamp_limit, EventLog};

fn small_limits() -> Limits {
    Limits { max_node_events: 5, max_workspace_events: 3, ..Limits::default() }
}

#[test]
fn rings_stay_bounded_and_newest_first() {
    let log = EventLog::new("node-1", small_limits());
    for i in 0..10 {
        log.append_node_event(
            Some("ws-1"),
            EventLevel::Info,
            "workspace.test",
            &format!("event {i}"),
            serde_json::Value::Null,
        );
    }

    let node = log.node_events(100);
    assert_eq!(node.len(), 5);
    assert_eq!(node[0].message, "event 9");
    assert_eq!(node[4].message, "event 5");

    let ws = log.workspace_events("ws-1", 100);
    assert_eq!(ws.len(), 3);
    assert_eq!(ws[0].message, "event 9");
}

#[test]
fn node_only_events_skip_workspace_ring() {
    let log = EventLog::new("node-1", small_limits());
    log.append_node_event(None, EventLevel::Warn, "node.start", "up", json!({"v": 1}));

    assert_eq!(log.node_events(10).len(), 1);
    assert!(log.workspace_events("ws-1", 10).is_empty());
}

#[test]
fn event_ids_are_16_hex_chars() {
    let log = EventLog::new("node-1", small_limits());
    log.append_node_event(None, EventLevel::Info, "t", "m", serde_json::Value::Null);
    let id = &log.node_events(1)[0].id;
    assert_eq!(id.len(), 16);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn limit_caps_read_not_storage() {
    let log = EventLog::new("node-1", small_limits());
    for i in 0..5 {
        log.append_node_event(None, EventLevel::Info, "t", &format!("{i}"), serde_json::Value::Null);
    }
    assert_eq!(log.node_events(2).len(), 2);
}

#[yare::parameterized(
    default   = { None, 100 },
    explicit  = { Some(50), 50 },
    clamped   = { Some(9999), 500 },
    zero      = { Some(0), 0 },
)]
fn limit_clamping(input: Option<usize>, expected: usize) {
    assert_eq!(clamp_limit(input), expected);
}
