// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon wiring: shared state, router, startup, and shutdown.

use std::sync::Arc;

use axum::routing::{any, get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use sam_storage::Store;

use crate::acp::{AcpSessionManager, AgentLauncher};
use crate::auth::{AuthGate, TokenValidator};
use crate::bootlog::BootLogManager;
use crate::callbacks::{ControlPlane, HeartbeatBody};
use crate::config::NodeConfig;
use crate::events::EventLog;
use crate::handlers;
use crate::provisioner::{ContainerResolver, WorkspaceProvisioner};
use crate::pty::PtySessionManager;
use crate::workspace::{ProvisionDeps, WorkspaceRegistry};

/// External collaborators injected at startup.
pub struct DaemonDeps {
    pub store: Store,
    pub control: Arc<dyn ControlPlane>,
    pub provisioner: Arc<dyn WorkspaceProvisioner>,
    pub containers: Arc<dyn ContainerResolver>,
    pub launcher: Arc<dyn AgentLauncher>,
    pub validator: Arc<dyn TokenValidator>,
}

/// Shared state behind every handler.
pub struct NodeState {
    pub config: NodeConfig,
    pub store: Store,
    pub registry: WorkspaceRegistry,
    pub events: Arc<EventLog>,
    pub bootlog: Arc<BootLogManager>,
    pub acp: AcpSessionManager,
    pub auth: AuthGate,
    pub control: Arc<dyn ControlPlane>,
    pub provisioner: Arc<dyn WorkspaceProvisioner>,
    pub containers: Arc<dyn ContainerResolver>,
    /// Process-wide PTY manager for the legacy single-workspace shape.
    pub shared_pty: PtySessionManager,
    /// Client for the container port reverse proxy.
    pub proxy_client: reqwest::Client,
    pub shutdown: CancellationToken,
}

impl NodeState {
    pub fn provision_deps(&self) -> ProvisionDeps {
        ProvisionDeps {
            registry: self.registry.clone(),
            control: Arc::clone(&self.control),
            provisioner: Arc::clone(&self.provisioner),
            bootlog: Arc::clone(&self.bootlog),
            events: self.events.clone(),
            bootstrap_timeout: self.config.bootstrap_timeout,
        }
    }
}

/// The daemon: owns the shared state and its background tasks.
pub struct Daemon {
    state: Arc<NodeState>,
}

impl Daemon {
    pub fn new(config: NodeConfig, deps: DaemonDeps) -> Self {
        let limits = config.limits;
        let shared_pty = PtySessionManager::new(limits.pty_output_buffer_size);
        let events = EventLog::new(config.node_id.clone(), limits);
        let registry =
            WorkspaceRegistry::new(config.clone(), deps.store.clone(), shared_pty.clone());
        let acp = AcpSessionManager::new(
            deps.store.clone(),
            events.clone(),
            Arc::clone(&deps.launcher),
            config.acp.clone(),
            limits,
        );
        let auth = AuthGate::new(
            config.node_id.clone(),
            deps.validator,
            config.allowed_origins.clone(),
        );
        let proxy_client = reqwest::Client::builder()
            .timeout(config.http_read_timeout)
            .build()
            .unwrap_or_default();

        let state = Arc::new(NodeState {
            bootlog: Arc::new(BootLogManager::new(limits.max_boot_log_entries)),
            store: deps.store,
            registry,
            events,
            acp,
            auth,
            control: deps.control,
            provisioner: deps.provisioner,
            containers: deps.containers,
            shared_pty,
            proxy_client,
            shutdown: CancellationToken::new(),
            config,
        });
        Self { state }
    }

    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Build the router. Method-path dispatch for the full HTTP/WS surface.
    pub fn router(&self) -> Router {
        let state = self.state();
        Router::new()
            .route("/health", get(handlers::health::get_health))
            .route(
                "/workspaces",
                post(handlers::workspaces::create_workspace)
                    .get(handlers::workspaces::list_workspaces),
            )
            .route(
                "/workspaces/{id}",
                get(handlers::workspaces::get_workspace)
                    .delete(handlers::workspaces::delete_workspace),
            )
            .route("/workspaces/{id}/stop", post(handlers::workspaces::stop_workspace))
            .route("/workspaces/{id}/restart", post(handlers::workspaces::restart_workspace))
            .route("/workspaces/{id}/rebuild", post(handlers::workspaces::rebuild_workspace))
            .route("/workspaces/{id}/events", get(handlers::events::workspace_events))
            .route("/events", get(handlers::events::node_events))
            .route(
                "/workspaces/{id}/agent-sessions",
                post(handlers::agent_sessions::create_agent_session)
                    .get(handlers::agent_sessions::list_agent_sessions),
            )
            .route(
                "/workspaces/{id}/agent-sessions/{session_id}/stop",
                post(handlers::agent_sessions::stop_agent_session),
            )
            .route(
                "/workspaces/{id}/agent-sessions/{session_id}/suspend",
                post(handlers::agent_sessions::suspend_agent_session),
            )
            .route(
                "/workspaces/{id}/agent-sessions/{session_id}/resume",
                post(handlers::agent_sessions::resume_agent_session),
            )
            .route(
                "/workspaces/{id}/agent-sessions/{session_id}/start",
                post(handlers::agent_sessions::start_agent_session),
            )
            .route("/workspaces/{id}/tabs", get(handlers::tabs::list_tabs))
            .route("/workspaces/{id}/ports/{port}", any(handlers::ports::port_proxy))
            .route(
                "/workspaces/{id}/ports/{port}/{*path}",
                any(handlers::ports::port_proxy),
            )
            .route("/terminal/ws", get(handlers::terminal_ws::terminal_ws))
            .route("/terminal/ws/multi", get(handlers::terminal_ws::terminal_ws))
            .route("/agent/ws", get(handlers::agent_ws::agent_ws))
            .route("/boot-log/ws", get(handlers::bootlog_ws::bootlog_ws))
            .route("/git-credential", get(handlers::git_credential::git_credential))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve on `listener` until `stop` is called. Announces readiness to
    /// the control plane and starts the heartbeat loop.
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        let state = self.state();
        if let Err(e) = state.control.node_ready().await {
            warn!(error = %e, "node ready callback undelivered");
        }
        self.spawn_heartbeat();

        let shutdown = state.shutdown.clone();
        info!(node_id = %state.config.node_id, "daemon serving");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }

    fn spawn_heartbeat(&self) {
        let state = self.state();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(state.config.heartbeat_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = state.shutdown.cancelled() => return,
                    _ = interval.tick() => {}
                }
                let body = HeartbeatBody {
                    node_id: state.config.node_id.clone(),
                    active_workspaces: state.registry.active_count(),
                    metrics: Some(serde_json::json!({
                        "agentSessions": state.acp.running_count(),
                    })),
                };
                if let Err(e) = state.control.heartbeat(&body).await {
                    warn!(error = %e, "heartbeat undelivered");
                }
            }
        });
    }

    /// Stop everything: hosts, PTYs, store, and the HTTP server.
    pub async fn stop(&self) {
        let state = self.state();
        state.shutdown.cancel();
        state.acp.stop_all().await;
        for runtime in state.registry.list() {
            runtime.pty.close_all();
        }
        state.shared_pty.close_all();
        state.store.close();
        info!("daemon stopped");
    }
}
