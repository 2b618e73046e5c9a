// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use sam_core::{Limits, WorkspaceId, WorkspaceStatus, STOP_SOURCES};
use sam_storage::Store;
use tempfile::tempdir;

use crate::bootlog::BootLogManager;
use crate::config::NodeConfig;
use crate::events::EventLog;
use crate::pty::PtySessionManager;
use crate::testing::{FakeProvisioner, RecordingControlPlane};
use crate::workspace::{
    start_workspace_provision, ProvisionDeps, ProvisionLabels, WorkspaceRegistry,
};

struct Harness {
    deps: ProvisionDeps,
    registry: WorkspaceRegistry,
    control: Arc<RecordingControlPlane>,
    events: Arc<EventLog>,
    _dir: tempfile::TempDir,
}

fn harness(provisioner: Arc<FakeProvisioner>) -> Harness {
    let dir = tempdir().unwrap();
    let config = NodeConfig::for_tests(dir.path().to_path_buf());
    let store = Store::open_in_memory().unwrap();
    let registry =
        WorkspaceRegistry::new(config, store, PtySessionManager::new(4096));
    let control = Arc::new(RecordingControlPlane::new());
    let events = EventLog::new("node-test", Limits::default());
    let deps = ProvisionDeps {
        registry: registry.clone(),
        control: control.clone(),
        provisioner,
        bootlog: Arc::new(BootLogManager::new(100)),
        events: events.clone(),
        bootstrap_timeout: Duration::from_secs(5),
    };
    Harness { deps, registry, control, events, _dir: dir }
}

#[tokio::test]
async fn success_moves_creating_to_running() {
    let h = harness(Arc::new(FakeProvisioner::succeeding(false)));
    let ws = WorkspaceId::new("ws-1");
    let runtime = h.registry.upsert(&ws, "github.com/acme/app", "main", WorkspaceStatus::Creating, None);

    start_workspace_provision(h.deps.clone(), runtime, ProvisionLabels::create())
        .await
        .unwrap();

    assert_eq!(h.registry.get("ws-1").unwrap().status, WorkspaceStatus::Running);
    let events = h.events.workspace_events("ws-1", 10);
    assert!(events.iter().any(|e| e.kind == "workspace.provisioned"));
    // The boot log completed for late joiners.
    assert!(h.deps.bootlog.get_or_create("ws-1").is_complete());
}

#[tokio::test]
async fn devcontainer_fallback_moves_to_recovery_with_flags() {
    let h = harness(Arc::new(FakeProvisioner::succeeding(true)));
    let ws = WorkspaceId::new("ws-1");
    let runtime = h.registry.upsert(&ws, "", "", WorkspaceStatus::Creating, None);

    start_workspace_provision(h.deps.clone(), runtime, ProvisionLabels::create())
        .await
        .unwrap();

    assert_eq!(h.registry.get("ws-1").unwrap().status, WorkspaceStatus::Recovery);
    let events = h.events.workspace_events("ws-1", 10);
    let provisioned = events.iter().find(|e| e.kind == "workspace.provisioned").unwrap();
    assert_eq!(provisioned.detail["devcontainerFallback"], true);
    assert_eq!(provisioned.detail["recoveryMode"], true);
}

#[tokio::test]
async fn failure_reports_callback_with_workspace_token_and_event() {
    let h = harness(Arc::new(FakeProvisioner::failing("container build failed: OOM")));
    let ws = WorkspaceId::new("ws-1");
    let runtime =
        h.registry.upsert(&ws, "", "", WorkspaceStatus::Creating, Some("cb-token".into()));

    start_workspace_provision(h.deps.clone(), runtime, ProvisionLabels::create())
        .await
        .unwrap();

    assert_eq!(h.registry.get("ws-1").unwrap().status, WorkspaceStatus::Error);

    // Exactly one provisioning-failed callback, authenticated with the
    // workspace callback token.
    let calls = h.control.failed_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "ws-1");
    assert!(calls[0].1.contains("container build failed: OOM"));
    assert_eq!(calls[0].2.as_deref(), Some("cb-token"));

    let events = h.events.workspace_events("ws-1", 10);
    let failed = events.iter().find(|e| e.kind == "workspace.provisioning_failed").unwrap();
    assert!(failed.detail["error"].as_str().unwrap().contains("OOM"));
}

#[tokio::test]
async fn stop_during_provisioning_is_not_overwritten() {
    let provisioner =
        Arc::new(FakeProvisioner::succeeding(false).with_delay(Duration::from_millis(200)));
    let h = harness(provisioner);
    let ws = WorkspaceId::new("ws-1");
    let runtime = h.registry.upsert(&ws, "", "", WorkspaceStatus::Creating, None);

    let handle = start_workspace_provision(h.deps.clone(), runtime, ProvisionLabels::create());

    // The user stops while provisioning runs.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.registry.cas("ws-1", STOP_SOURCES, WorkspaceStatus::Stopped).unwrap();

    handle.await.unwrap();

    // The completion lost the CAS race; stopped is preserved.
    assert_eq!(h.registry.get("ws-1").unwrap().status, WorkspaceStatus::Stopped);
    let events = h.events.workspace_events("ws-1", 10);
    assert!(events.iter().any(|e| e.kind == "workspace.provision_superseded"));
}

#[tokio::test]
async fn git_token_failure_is_non_fatal() {
    // RecordingControlPlane returns Ok(None) for git tokens; provisioning
    // should proceed and succeed regardless.
    let provisioner = Arc::new(FakeProvisioner::succeeding(false));
    let h = harness(provisioner.clone());
    let ws = WorkspaceId::new("ws-1");
    let runtime = h.registry.upsert(&ws, "", "", WorkspaceStatus::Creating, None);

    start_workspace_provision(h.deps.clone(), runtime, ProvisionLabels::create())
        .await
        .unwrap();

    assert_eq!(h.registry.get("ws-1").unwrap().status, WorkspaceStatus::Running);
    assert_eq!(provisioner.calls().len(), 1);
    assert!(provisioner.calls()[0].git_token.is_none());
}

#[tokio::test]
async fn provision_config_comes_from_the_runtime() {
    let provisioner = Arc::new(FakeProvisioner::succeeding(false));
    let h = harness(provisioner.clone());
    let ws = WorkspaceId::new("ws-1");
    let runtime = h.registry.upsert(
        &ws,
        "github.com/acme/app",
        "feature/x",
        WorkspaceStatus::Creating,
        Some("cb-token".into()),
    );

    start_workspace_provision(h.deps.clone(), runtime.clone(), ProvisionLabels::create())
        .await
        .unwrap();

    let cfg = &provisioner.calls()[0];
    assert_eq!(cfg.workspace_id, "ws-1");
    assert_eq!(cfg.repository, "github.com/acme/app");
    assert_eq!(cfg.branch, "feature/x");
    assert_eq!(cfg.workspace_dir, runtime.workspace_dir);
    assert_eq!(cfg.container_label, runtime.container_label);
    assert_eq!(cfg.container_workdir, runtime.container_workdir);
    assert_eq!(cfg.callback_token.as_deref(), Some("cb-token"));
}
