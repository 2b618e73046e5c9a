// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session specs: auto-resume on attach, stopped-session rejection,
//! idempotent creation, viewer replay.

use serde_json::json;

use sam_daemon::testing::FakeProvisioner;

use crate::harness::{
    connect_ws, start_node, try_connect_ws, ws_recv_until, ws_send, TestNode,
};

fn agent_path(node: &TestNode, workspace: &str, session: &str) -> String {
    format!(
        "/agent/ws?workspace={workspace}&sessionId={session}&token={}",
        node.workspace_token("user-a", workspace)
    )
}

async fn create_agent_session(node: &TestNode, workspace: &str, session: &str) {
    let response = node
        .client
        .post(node.url(&format!("/workspaces/{workspace}/agent-sessions")))
        .bearer_auth(node.mgmt_token())
        .json(&json!({"sessionId": session, "label": "chat"}))
        .send()
        .await
        .expect("create agent session");
    assert_eq!(response.status().as_u16(), 201, "create agent session");
}

async fn session_view(node: &TestNode, workspace: &str, session: &str) -> serde_json::Value {
    let response = node
        .client
        .get(node.url(&format!("/workspaces/{workspace}/agent-sessions")))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("list agent sessions");
    let body: serde_json::Value = response.json().await.expect("json");
    body["sessions"]
        .as_array()
        .expect("sessions array")
        .iter()
        .find(|s| s["sessionId"] == session)
        .cloned()
        .unwrap_or(serde_json::Value::Null)
}

#[tokio::test]
async fn suspend_then_attach_auto_resumes_preserving_acp_session() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;
    create_agent_session(&node, "ws-1", "sess-1").await;

    // First attach starts the agent and records its session id.
    let mut ws = connect_ws(&node, &agent_path(&node, "ws-1", "sess-1")).await;
    ws_recv_until(&mut ws, |v| v["type"] == "replay").await;
    drop(ws);

    let acp_id = {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let view = session_view(&node, "ws-1", "sess-1").await;
            if let Some(id) = view["acpSessionId"].as_str() {
                break id.to_string();
            }
            assert!(tokio::time::Instant::now() < deadline, "acp session id never recorded");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    };

    // Suspend: child gone, record suspended, id preserved.
    let response = node
        .client
        .post(node.url("/workspaces/ws-1/agent-sessions/sess-1/suspend"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("suspend");
    assert_eq!(response.status().as_u16(), 200);
    let view = session_view(&node, "ws-1", "sess-1").await;
    assert_eq!(view["status"], "suspended");
    assert_eq!(view["acpSessionId"], acp_id.as_str());

    // Attaching transparently resumes and reuses the preserved id.
    let mut ws = connect_ws(&node, &agent_path(&node, "ws-1", "sess-1")).await;
    ws_recv_until(&mut ws, |v| v["type"] == "replay").await;
    drop(ws);

    let view = session_view(&node, "ws-1", "sess-1").await;
    assert_eq!(view["status"], "running");
    assert_eq!(view["acpSessionId"], acp_id.as_str());

    // The relaunch passed the previous session id to the agent.
    let launches = node.launcher.launches();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[1].previous_acp_session.as_deref(), Some(acp_id.as_str()));
}

#[tokio::test]
async fn attach_to_stopped_session_is_rejected_with_409() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;
    create_agent_session(&node, "ws-1", "sess-2").await;

    let response = node
        .client
        .post(node.url("/workspaces/ws-1/agent-sessions/sess-2/stop"))
        .bearer_auth(node.mgmt_token())
        .send()
        .await
        .expect("stop");
    assert_eq!(response.status().as_u16(), 200);

    let err = try_connect_ws(&node, &agent_path(&node, "ws-1", "sess-2")).await;
    assert_eq!(err.err(), Some(409));

    let view = session_view(&node, "ws-1", "sess-2").await;
    assert_eq!(view["status"], "stopped");
}

#[tokio::test]
async fn create_is_idempotent_under_key() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;

    let post = |label: &'static str| {
        let node_url = node.url("/workspaces/ws-1/agent-sessions");
        let client = node.client.clone();
        let token = node.mgmt_token();
        async move {
            client
                .post(node_url)
                .bearer_auth(token)
                .header("Idempotency-Key", "idem-1")
                .json(&json!({"sessionId": "sess-1", "label": label}))
                .send()
                .await
                .expect("create agent session")
        }
    };

    let first = post("original").await;
    assert_eq!(first.status().as_u16(), 201);

    let replay = post("changed").await;
    assert_eq!(replay.status().as_u16(), 200);
    let body: serde_json::Value = replay.json().await.expect("json");
    assert_eq!(body["label"], "original");

    // No duplicate was created.
    let view = session_view(&node, "ws-1", "sess-1").await;
    assert_eq!(view["label"], "original");
}

#[tokio::test]
async fn viewers_prompt_and_replay_through_the_host() {
    let node = start_node(FakeProvisioner::succeeding(false)).await;
    node.create_workspace("ws-1", None).await;
    node.wait_for_status("ws-1", "running").await;
    create_agent_session(&node, "ws-1", "sess-1").await;

    let mut viewer_a = connect_ws(&node, &agent_path(&node, "ws-1", "sess-1")).await;
    ws_recv_until(&mut viewer_a, |v| v["type"] == "replay").await;

    ws_send(&mut viewer_a, json!({"type": "prompt", "text": "hello agent"})).await;
    ws_recv_until(&mut viewer_a, |v| {
        v["type"] == "message" && v["payload"]["type"] == "agent_message"
    })
    .await;
    // Wait for the turn to finish so the host is back to ready.
    ws_recv_until(&mut viewer_a, |v| {
        v["type"] == "message" && v["payload"]["type"] == "result"
    })
    .await;

    // A second viewer replays the full conversation.
    let mut viewer_b = connect_ws(&node, &agent_path(&node, "ws-1", "sess-1")).await;
    let replay = ws_recv_until(&mut viewer_b, |v| v["type"] == "replay").await;
    let texts: Vec<&str> = replay["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .filter_map(|m| m["type"].as_str())
        .collect();
    assert!(texts.contains(&"user_message"));
    assert!(texts.contains(&"agent_message"));

    let view = session_view(&node, "ws-1", "sess-1").await;
    assert_eq!(view["viewerCount"], 2);
    assert_eq!(view["hostStatus"], "ready");
}
