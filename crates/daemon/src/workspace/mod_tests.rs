// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use sam_core::{WorkspaceId, WorkspaceStatus, STOP_SOURCES};
use sam_storage::Store;
use tempfile::tempdir;

use crate::config::NodeConfig;
use crate::pty::PtySessionManager;

use super::{RegistryError, WorkspaceRegistry};

fn registry_with(config: NodeConfig) -> (WorkspaceRegistry, Store) {
    let store = Store::open_in_memory().unwrap();
    let shared = PtySessionManager::new(4096);
    (WorkspaceRegistry::new(config, store.clone(), shared), store)
}

fn registry() -> (WorkspaceRegistry, Store, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let config = NodeConfig::for_tests(dir.path().to_path_buf());
    let (reg, store) = registry_with(config);
    (reg, store, dir)
}

#[test]
fn upsert_creates_and_derives_paths() {
    let (reg, store, dir) = registry();
    let ws = WorkspaceId::new("ws-1");

    let runtime = reg.upsert(&ws, "github.com/acme/app", "main", WorkspaceStatus::Creating, None);
    assert_eq!(runtime.status, WorkspaceStatus::Creating);
    assert_eq!(
        runtime.workspace_dir,
        dir.path().join("ws-1").to_string_lossy().to_string()
    );
    assert_eq!(runtime.container_workdir, "/workspaces/app");
    assert_eq!(runtime.container_label, "ws-1");

    // Metadata persisted on creation.
    let meta = store.get_workspace("ws-1").unwrap().unwrap();
    assert_eq!(meta.repository, "github.com/acme/app");
    assert_eq!(meta.container_workdir, "/workspaces/app");
}

#[test]
fn upsert_is_idempotent_per_workspace_id() {
    let (reg, _store, _dir) = registry();
    let ws = WorkspaceId::new("ws-1");

    reg.upsert(&ws, "github.com/acme/app", "main", WorkspaceStatus::Creating, None);
    let again = reg.upsert(&ws, "", "", WorkspaceStatus::Stopped, Some("tok".into()));

    // The existing runtime is returned; status is untouched, token updated.
    assert_eq!(again.status, WorkspaceStatus::Creating);
    assert_eq!(again.callback_token.as_deref(), Some("tok"));
    assert_eq!(reg.list().len(), 1);
}

#[test]
fn upsert_hydrates_from_persisted_metadata() {
    let dir = tempdir().unwrap();
    let config = NodeConfig::for_tests(dir.path().to_path_buf());
    let store = Store::open_in_memory().unwrap();
    let shared = PtySessionManager::new(4096);

    store
        .upsert_workspace(&sam_storage::WorkspaceMeta {
            workspace_id: "ws-1".to_string(),
            repository: "github.com/acme/app".to_string(),
            branch: "develop".to_string(),
            status: "stopped".to_string(),
            workspace_dir: "/srv/elsewhere/ws-1".to_string(),
            container_label: "label-1".to_string(),
            container_workdir: "/workspaces/app".to_string(),
            container_user: "dev".to_string(),
            git_user_name: "Dev".to_string(),
            git_user_email: "dev@acme.test".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .unwrap();

    let reg = WorkspaceRegistry::new(config, store, shared);
    let runtime = reg.upsert(
        &WorkspaceId::new("ws-1"),
        "",
        "",
        WorkspaceStatus::Creating,
        None,
    );

    // Metadata wins over derived defaults when the args are empty.
    assert_eq!(runtime.repository, "github.com/acme/app");
    assert_eq!(runtime.branch, "develop");
    assert_eq!(runtime.workspace_dir, "/srv/elsewhere/ws-1");
    assert_eq!(runtime.container_label, "label-1");
    assert_eq!(runtime.container_user, "dev");
}

#[test]
fn cas_enforces_expected_set() {
    let (reg, _store, _dir) = registry();
    let ws = WorkspaceId::new("ws-1");
    reg.upsert(&ws, "", "", WorkspaceStatus::Creating, None);

    // creating -> running via provisioning completion.
    let updated = reg.cas("ws-1", &[WorkspaceStatus::Creating], WorkspaceStatus::Running).unwrap();
    assert_eq!(updated.status, WorkspaceStatus::Running);

    // A second completion loses: not creating anymore.
    let err = reg.cas("ws-1", &[WorkspaceStatus::Creating], WorkspaceStatus::Running);
    assert!(matches!(err, Err(RegistryError::InvalidTransition { from: WorkspaceStatus::Running })));

    // Stop from any live state.
    reg.cas("ws-1", STOP_SOURCES, WorkspaceStatus::Stopped).unwrap();
    assert_eq!(reg.get("ws-1").unwrap().status, WorkspaceStatus::Stopped);

    // Unknown workspace.
    assert!(matches!(
        reg.cas("nope", STOP_SOURCES, WorkspaceStatus::Stopped),
        Err(RegistryError::NotFound(_))
    ));
}

#[test]
fn status_sequence_follows_transition_table() {
    let (reg, _store, _dir) = registry();
    let ws = WorkspaceId::new("ws-1");
    reg.upsert(&ws, "", "", WorkspaceStatus::Creating, None);

    let mut observed = vec![WorkspaceStatus::Creating];
    for (expected, next) in [
        (vec![WorkspaceStatus::Creating], WorkspaceStatus::Error),
        (vec![WorkspaceStatus::Stopped, WorkspaceStatus::Error], WorkspaceStatus::Creating),
        (vec![WorkspaceStatus::Creating], WorkspaceStatus::Running),
        (STOP_SOURCES.to_vec(), WorkspaceStatus::Stopped),
    ] {
        let updated = reg.cas("ws-1", &expected, next).unwrap();
        observed.push(updated.status);
    }

    // Every observed adjacent pair is a legal transition.
    for pair in observed.windows(2) {
        assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
    }
}

#[test]
fn host_mode_shares_the_process_wide_pty_manager() {
    let (reg, _store, _dir) = registry();

    // Container mode is off, so every runtime reuses the shared manager.
    let a = reg.upsert(&WorkspaceId::new("ws-a"), "", "", WorkspaceStatus::Creating, None);
    let b = reg.upsert(&WorkspaceId::new("ws-b"), "", "", WorkspaceStatus::Creating, None);
    assert!(a.pty.ptr_eq(&b.pty));
}

#[test]
fn container_mode_gives_each_workspace_its_own_pty_manager() {
    let dir = tempdir().unwrap();
    let mut config = NodeConfig::for_tests(dir.path().to_path_buf());
    config.container_mode = true;
    let (reg, _store) = registry_with(config);

    let a = reg.upsert(&WorkspaceId::new("ws-a"), "", "", WorkspaceStatus::Creating, None);
    let b = reg.upsert(&WorkspaceId::new("ws-b"), "", "", WorkspaceStatus::Creating, None);
    assert!(!a.pty.ptr_eq(&b.pty));
}

#[test]
fn legacy_adoption_takes_over_repo_directory() {
    let dir = tempdir().unwrap();
    let config = NodeConfig::for_tests(dir.path().to_path_buf());
    let store = Store::open_in_memory().unwrap();

    // Simulate the pre-multiplexing layout: the repo checked out directly
    // under the base directory, metadata pointing at the base dir.
    std::fs::create_dir(dir.path().join("app")).unwrap();
    store
        .upsert_workspace(&sam_storage::WorkspaceMeta {
            workspace_id: "ws-1".to_string(),
            repository: "github.com/acme/app".to_string(),
            branch: "main".to_string(),
            status: "stopped".to_string(),
            workspace_dir: dir.path().to_string_lossy().to_string(),
            container_label: String::new(),
            container_workdir: String::new(),
            container_user: String::new(),
            git_user_name: String::new(),
            git_user_email: String::new(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .unwrap();

    let reg = WorkspaceRegistry::new(config, store, PtySessionManager::new(4096));
    let runtime = reg.upsert(
        &WorkspaceId::new("ws-1"),
        "",
        "",
        WorkspaceStatus::Creating,
        None,
    );

    assert_eq!(
        runtime.workspace_dir,
        dir.path().join("app").to_string_lossy().to_string()
    );
    assert_eq!(runtime.container_label, "app");
}
