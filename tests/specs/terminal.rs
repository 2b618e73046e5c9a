// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer specs: reattach with scrollback, cross-user
//! isolation.

use std::time::Duration;

use serde_json::json;

use sam_daemon::testing::FakeProvisioner;

use crate::harness::{connect_ws, start_node, ws_recv_until, ws_send};

fn terminal_path(node: &crate::harness::TestNode, user: &str, workspace: &str) -> String {
    format!(
        "/terminal/ws/multi?workspace={workspace}&token={}",
        node.workspace_token(user, workspace)
    )
}

#[tokio::test]
async fn terminal_reattach_preserves_output() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    // First connection: create a session and produce output.
    let mut ws = connect_ws(&node, &terminal_path(&node, "user-a", "ws-1")).await;
    ws_send(&mut ws, json!({"type": "create_session", "sessionId": "sess-1", "rows": 24, "cols": 80}))
        .await;
    ws_recv_until(&mut ws, |v| v["type"] == "session_created").await;

    ws_send(
        &mut ws,
        json!({"type": "input", "sessionId": "sess-1", "data": "echo hello-reconnect\n"}),
    )
    .await;
    ws_recv_until(&mut ws, |v| {
        v["type"] == "output"
            && v["data"].as_str().is_some_and(|d| d.contains("hello-reconnect"))
    })
    .await;

    // Drop the socket; the session must survive as an orphan.
    drop(ws);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Second connection: the session is listed and reattach replays the
    // scrollback.
    let mut ws = connect_ws(&node, &terminal_path(&node, "user-a", "ws-1")).await;
    ws_send(&mut ws, json!({"type": "list_sessions"})).await;
    let list = ws_recv_until(&mut ws, |v| v["type"] == "session_list").await;
    let ids: Vec<&str> = list["sessions"]
        .as_array()
        .expect("sessions array")
        .iter()
        .filter_map(|s| s["sessionId"].as_str())
        .collect();
    assert_eq!(ids, ["sess-1"]);

    ws_send(&mut ws, json!({"type": "reattach_session", "sessionId": "sess-1"})).await;
    ws_recv_until(&mut ws, |v| v["type"] == "session_reattached").await;
    let scrollback = ws_recv_until(&mut ws, |v| v["type"] == "scrollback").await;
    assert!(
        scrollback["data"].as_str().is_some_and(|d| d.contains("hello-reconnect")),
        "scrollback missing output: {scrollback}"
    );

    ws_send(&mut ws, json!({"type": "close_session", "sessionId": "sess-1"})).await;
    ws_recv_until(&mut ws, |v| v["type"] == "session_closed").await;
}

#[tokio::test]
async fn cross_user_session_access_is_denied() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    // User A owns sess-A.
    let mut ws_a = connect_ws(&node, &terminal_path(&node, "user-a", "ws-1")).await;
    ws_send(
        &mut ws_a,
        json!({"type": "create_session", "sessionId": "sess-A", "rows": 24, "cols": 80}),
    )
    .await;
    ws_recv_until(&mut ws_a, |v| v["type"] == "session_created").await;

    // User B cannot close, write to, or rename it.
    let mut ws_b = connect_ws(&node, &terminal_path(&node, "user-b", "ws-1")).await;
    ws_send(&mut ws_b, json!({"type": "close_session", "sessionId": "sess-A"})).await;
    let err = ws_recv_until(&mut ws_b, |v| v["type"] == "error").await;
    assert_eq!(err["message"], "not authorized");

    ws_send(
        &mut ws_b,
        json!({"type": "input", "sessionId": "sess-A", "data": "whoami\n"}),
    )
    .await;
    let err = ws_recv_until(&mut ws_b, |v| v["type"] == "error").await;
    assert_eq!(err["message"], "not authorized");

    // And it does not appear in B's listing.
    ws_send(&mut ws_b, json!({"type": "list_sessions"})).await;
    let list = ws_recv_until(&mut ws_b, |v| v["type"] == "session_list").await;
    assert!(list["sessions"].as_array().expect("sessions array").is_empty());

    // The session is still live for user A.
    ws_send(&mut ws_a, json!({"type": "list_sessions"})).await;
    let list = ws_recv_until(&mut ws_a, |v| v["type"] == "session_list").await;
    assert_eq!(list["sessions"].as_array().expect("sessions array").len(), 1);

    ws_send(&mut ws_a, json!({"type": "close_session", "sessionId": "sess-A"})).await;
    ws_recv_until(&mut ws_a, |v| v["type"] == "session_closed").await;
}

#[tokio::test]
async fn ping_gets_pong() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    let mut ws = connect_ws(&node, &terminal_path(&node, "user-a", "ws-1")).await;
    ws_send(&mut ws, json!({"type": "ping"})).await;
    ws_recv_until(&mut ws, |v| v["type"] == "pong").await;
}
