// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface specs: health, auth symmetry, route headers, events.

use serde_json::json;

use sam_daemon::testing::FakeProvisioner;

use crate::harness::start_node;

#[tokio::test]
async fn health_reports_workspaces_and_sessions() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    let response = node.client.get(node.url("/health")).send().await.expect("health");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["nodeId"], "node-test");
    assert_eq!(body["activeWorkspaces"], 1);
    assert_eq!(body["workspaces"][0]["id"], "ws-1");
    assert_eq!(body["workspaces"][0]["status"], "running");
}

#[tokio::test]
async fn mutations_require_management_auth() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;

    // No credential at all.
    let response = node
        .client
        .post(node.url("/workspaces"))
        .json(&json!({"workspaceId": "ws-1"}))
        .send()
        .await
        .expect("create");
    assert_eq!(response.status().as_u16(), 401);

    // A workspace token is not a management credential.
    let response = node
        .client
        .post(node.url("/workspaces"))
        .bearer_auth(node.workspace_token("user-a", "ws-1"))
        .json(&json!({"workspaceId": "ws-1"}))
        .send()
        .await
        .expect("create");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn workspace_claim_mismatch_is_rejected_everywhere() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.create_workspace("ws-2", None).await;
    node.wait_for_status("ws-1", "running").await;
    node.wait_for_status("ws-2", "running").await;

    // A token scoped to ws-2 cannot read ws-1 endpoints.
    let token = node.workspace_token("user-a", "ws-2");
    for path in ["/workspaces/ws-1/tabs", "/workspaces/ws-1/events", "/workspaces/ws-1/agent-sessions"] {
        let response = node
            .client
            .get(node.url(&format!("{path}?token={token}")))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 403, "{path}");
        let body: serde_json::Value = response.json().await.expect("json");
        assert_eq!(body["error"], "workspace claim mismatch", "{path}");
    }
}

#[tokio::test]
async fn route_headers_must_match_node_and_path() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;

    // Wrong node id.
    let response = node
        .client
        .post(node.url("/workspaces/ws-1/stop"))
        .bearer_auth(node.mgmt_token())
        .header("X-SAM-Node-Id", "node-other")
        .send()
        .await
        .expect("stop");
    assert_eq!(response.status().as_u16(), 403);

    // Workspace header disagreeing with the path.
    let response = node
        .client
        .post(node.url("/workspaces/ws-1/stop"))
        .bearer_auth(node.mgmt_token())
        .header("X-SAM-Workspace-Id", "ws-2")
        .send()
        .await
        .expect("stop");
    assert_eq!(response.status().as_u16(), 403);

    // Matching headers pass.
    let response = node
        .client
        .post(node.url("/workspaces/ws-1/stop"))
        .bearer_auth(node.mgmt_token())
        .header("X-SAM-Node-Id", "node-test")
        .header("X-SAM-Workspace-Id", "ws-1")
        .send()
        .await
        .expect("stop");
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn node_events_are_readable_with_management_query_token() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    let token = node.mgmt_token();
    let response = node
        .client
        .get(node.url(&format!("/events?token={token}&limit=2")))
        .send()
        .await
        .expect("events");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    let events = body["events"].as_array().expect("events array");
    assert!(events.len() <= 2);
    assert_eq!(body["nextCursor"], serde_json::Value::Null);
}

#[tokio::test]
async fn tabs_listing_tracks_sessions() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    // An agent session persists a chat tab.
    node.client
        .post(node.url("/workspaces/ws-1/agent-sessions"))
        .bearer_auth(node.mgmt_token())
        .json(&json!({"sessionId": "chat-1", "label": "assistant"}))
        .send()
        .await
        .expect("create agent session");

    let token = node.workspace_token("user-a", "ws-1");
    let response = node
        .client
        .get(node.url(&format!("/workspaces/ws-1/tabs?token={token}")))
        .send()
        .await
        .expect("tabs");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    let tabs = body["tabs"].as_array().expect("tabs array");
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0]["tabId"], "chat-1");
    assert_eq!(tabs[0]["kind"], "chat");
}

#[tokio::test]
async fn delete_workspace_removes_everything() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    let response = node
        .client
        .delete(node.url("/workspaces/ws-1"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("delete");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["success"], true);

    let response = node
        .client
        .get(node.url("/workspaces/ws-1"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("get");
    assert_eq!(response.status().as_u16(), 404);
}
