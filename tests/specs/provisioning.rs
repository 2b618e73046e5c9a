// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provisioning specs: failure callbacks, stop-during-provision, boot-log
//! streaming.

use std::time::Duration;

use sam_daemon::testing::FakeProvisioner;

use crate::harness::{connect_ws, start_node, ws_recv_until};

#[tokio::test]
async fn provisioning_failure_reports_callback_and_event() {
    let node =
        start_node(FakeProvisioner::failing("container build failed: OOM")).await;
    node.create_workspace("ws-1", Some("cb-token")).await;
    node.wait_for_status("ws-1", "error").await;

    // Exactly one provisioning-failed callback with the workspace token.
    let calls = node.control.failed_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "ws-1");
    assert!(calls[0].1.contains("container build failed: OOM"));
    assert_eq!(calls[0].2.as_deref(), Some("cb-token"));

    // And an error event in the workspace ring.
    let response = node
        .client
        .get(node.url("/workspaces/ws-1/events"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("events");
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["nextCursor"], serde_json::Value::Null);
    let kinds: Vec<&str> = body["events"]
        .as_array()
        .expect("events array")
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert!(kinds.contains(&"workspace.provisioning_failed"), "kinds: {kinds:?}");
}

#[tokio::test]
async fn stop_during_provisioning_wins_over_late_completion() {
    let node = start_node(
        FakeProvisioner::succeeding(false).with_delay(Duration::from_millis(300)),
    )
    .await;

    let response = node.create_workspace("ws-1", None).await;
    assert_eq!(response.status().as_u16(), 202);

    // Stop immediately, while provisioning is still in flight.
    let response = node
        .client
        .post(node.url("/workspaces/ws-1/stop"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("stop");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["status"], "stopped");

    // Provisioning completes afterwards; the terminal state must hold.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let response = node
        .client
        .get(node.url("/workspaces/ws-1"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("get");
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["status"], "stopped");
}

#[tokio::test]
async fn boot_log_stream_delivers_entries_then_complete() {
    let node = start_node(
        FakeProvisioner::succeeding(false).with_delay(Duration::from_millis(300)),
    )
    .await;
    node.create_workspace("ws-1", None).await;

    let path = format!(
        "/boot-log/ws?workspace=ws-1&token={}",
        node.workspace_token("user-a", "ws-1")
    );
    let mut ws = connect_ws(&node, &path).await;
    ws_recv_until(&mut ws, |v| v["type"] == "log" && v["step"] == "clone").await;
    ws_recv_until(&mut ws, |v| v["type"] == "complete").await;
}

#[tokio::test]
async fn late_boot_log_joiner_gets_sticky_complete() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    // Provisioning already finished; a late joiner still sees catch-up and
    // the sticky completion.
    let path = format!(
        "/boot-log/ws?workspace=ws-1&token={}",
        node.workspace_token("user-a", "ws-1")
    );
    let mut ws = connect_ws(&node, &path).await;
    ws_recv_until(&mut ws, |v| v["type"] == "complete").await;
}

#[tokio::test]
async fn restart_and_rebuild_follow_the_transition_table() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    // Rebuild from running is allowed.
    let response = node
        .client
        .post(node.url("/workspaces/ws-1/rebuild"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("rebuild");
    assert_eq!(response.status().as_u16(), 202);
    node.wait_for_status("ws-1", "running").await;

    // Restart from running is an invalid transition.
    let response = node
        .client
        .post(node.url("/workspaces/ws-1/restart"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("restart");
    assert_eq!(response.status().as_u16(), 409);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["error"], "invalid_transition");

    // Stop, then restart is allowed.
    node.client
        .post(node.url("/workspaces/ws-1/stop"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("stop");
    let response = node
        .client
        .post(node.url("/workspaces/ws-1/restart"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("restart");
    assert_eq!(response.status().as_u16(), 202);
    node.wait_for_status("ws-1", "running").await;
}
