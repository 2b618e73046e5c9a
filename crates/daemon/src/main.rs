// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! samd: the SAM node daemon binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sam_daemon::acp::StdioAgentLauncher;
use sam_daemon::auth::JwtValidator;
use sam_daemon::callbacks::HttpControlPlane;
use sam_daemon::provisioner::{DevcontainerCliProvisioner, DockerContainerResolver};
use sam_daemon::{Daemon, DaemonDeps, NodeConfig};
use sam_storage::Store;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sam_daemon=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();
    let config = NodeConfig::from_env();

    let store = match Store::open(&config.state_db) {
        Ok(store) => store,
        Err(e) => {
            error!(path = %config.state_db.display(), error = %e, "cannot open state db");
            return std::process::ExitCode::FAILURE;
        }
    };

    let deps = DaemonDeps {
        store,
        control: Arc::new(HttpControlPlane::new(
            config.control_plane_url.clone(),
            config.node_id.clone(),
            config.node_callback_token.clone(),
            config.http_read_timeout,
        )),
        provisioner: Arc::new(DevcontainerCliProvisioner),
        containers: Arc::new(DockerContainerResolver::new()),
        launcher: Arc::new(StdioAgentLauncher::new(config.acp.init_timeout)),
        validator: Arc::new(JwtValidator::new(
            config.management_secret.as_deref(),
            config.workspace_secret.as_deref(),
        )),
    };

    let bind_addr = config.bind_addr.clone();
    let daemon = Daemon::new(config, deps);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind_addr, error = %e, "cannot bind listener");
            return std::process::ExitCode::FAILURE;
        }
    };
    info!(bind_addr, "listening");

    let state = daemon.state();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            state.shutdown.cancel();
        }
    });

    let result = daemon.serve(listener).await;
    daemon.stop().await;

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server error");
            std::process::ExitCode::FAILURE
        }
    }
}
