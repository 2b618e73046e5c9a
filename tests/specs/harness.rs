// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec harness: an in-process daemon with fake collaborators, plus HTTP
//! and WebSocket client helpers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use sam_daemon::server::NodeState;
use sam_daemon::auth::JwtValidator;
use sam_daemon::testing::{
    make_jwt, FakeProvisioner, RecordingControlPlane, ScriptedAgentLauncher,
    StaticContainerResolver,
};
use sam_daemon::{Daemon, DaemonDeps, NodeConfig};
use sam_storage::Store;

pub const MGMT_SECRET: &str = "management-secret";
pub const WS_SECRET: &str = "workspace-secret";

pub struct TestNode {
    pub addr: SocketAddr,
    pub state: Arc<NodeState>,
    pub control: Arc<RecordingControlPlane>,
    pub launcher: Arc<ScriptedAgentLauncher>,
    pub provisioner: Arc<FakeProvisioner>,
    pub client: reqwest::Client,
    _dir: tempfile::TempDir,
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
    }
}

pub async fn start_node(provisioner: FakeProvisioner) -> TestNode {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = NodeConfig::for_tests(dir.path().to_path_buf());
    let control = Arc::new(RecordingControlPlane::new());
    let launcher = Arc::new(ScriptedAgentLauncher::new());
    let provisioner = Arc::new(provisioner);

    let deps = DaemonDeps {
        store: Store::open_in_memory().expect("store"),
        control: control.clone(),
        provisioner: provisioner.clone(),
        containers: StaticContainerResolver::none(),
        launcher: launcher.clone(),
        validator: Arc::new(JwtValidator::new(Some(MGMT_SECRET), Some(WS_SECRET))),
    };

    let daemon = Daemon::new(config, deps);
    let state = daemon.state();
    let listener =
        tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = daemon.serve(listener).await;
    });

    TestNode {
        addr,
        state,
        control,
        launcher,
        provisioner,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

impl TestNode {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn mgmt_token(&self) -> String {
        make_jwt(MGMT_SECRET, "control-plane", None)
    }

    pub fn workspace_token(&self, user: &str, workspace: &str) -> String {
        make_jwt(WS_SECRET, user, Some(workspace))
    }

    /// POST /workspaces and return the response.
    pub async fn create_workspace(
        &self,
        workspace_id: &str,
        callback_token: Option<&str>,
    ) -> reqwest::Response {
        let mut body = serde_json::json!({
            "workspaceId": workspace_id,
            "repository": "github.com/acme/app",
            "branch": "main",
        });
        if let Some(token) = callback_token {
            body["callbackToken"] = token.into();
        }
        self.client
            .post(self.url("/workspaces"))
            .bearer_auth(self.mgmt_token())
            .json(&body)
            .send()
            .await
            .expect("create workspace")
    }

    /// Poll GET /workspaces/{id} until its status matches.
    pub async fn wait_for_status(&self, workspace_id: &str, status: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let response = self
                .client
                .get(self.url(&format!("/workspaces/{workspace_id}")))
                .bearer_auth(self.mgmt_token())
                .send()
                .await
                .expect("get workspace");
            if response.status().is_success() {
                let body: serde_json::Value = response.json().await.expect("json");
                if body["status"] == status {
                    return;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "workspace {workspace_id} never reached {status}"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Open a WebSocket against the daemon.
pub async fn connect_ws(node: &TestNode, path_and_query: &str) -> WsStream {
    let url = format!("ws://{}{}", node.addr, path_and_query);
    let request = url.into_client_request().expect("ws request");
    let (stream, _) = tokio_tungstenite::connect_async(request).await.expect("ws connect");
    stream
}

/// Open a WebSocket, returning the HTTP error status if the upgrade was
/// rejected.
pub async fn try_connect_ws(node: &TestNode, path_and_query: &str) -> Result<WsStream, u16> {
    let url = format!("ws://{}{}", node.addr, path_and_query);
    let request = url.into_client_request().expect("ws request");
    match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _)) => Ok(stream),
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            Err(response.status().as_u16())
        }
        Err(e) => panic!("unexpected ws error: {e}"),
    }
}

/// Send one JSON value as a text frame.
pub async fn ws_send(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into())).await.expect("ws send");
}

/// Receive JSON frames until `pred` matches, with a 10s deadline.
pub async fn ws_recv_until<F: Fn(&serde_json::Value) -> bool>(
    ws: &mut WsStream,
    pred: F,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("timed out waiting for ws frame")
            .expect("ws closed")
            .expect("ws error");
        if let Message::Text(text) = frame {
            let value: serde_json::Value = serde_json::from_str(&text).expect("ws json");
            if pred(&value) {
                return value;
            }
        }
    }
}
