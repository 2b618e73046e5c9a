// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use super::{
    adopt_legacy_dir, container_workdir_for, derive_workspace_dir, repo_dir_name,
    sanitize_workspace_id,
};

#[yare::parameterized(
    clean      = { "ws-1", "ws-1" },
    dots       = { "ws.1_a-b", "ws.1_a-b" },
    slashes    = { "ws/../etc", "ws-..-etc" },
    spaces     = { "my ws", "my-ws" },
)]
fn sanitizes_ids(input: &str, expected: &str) {
    assert_eq!(sanitize_workspace_id(input), expected);
}

#[yare::parameterized(
    https      = { "https://github.com/acme/app.git", Some("app") },
    ssh_ish    = { "github.com/acme/app", Some("app") },
    trailing   = { "github.com/acme/app/", Some("app") },
    bare       = { "app", Some("app") },
    empty      = { "", None },
)]
fn repo_dir_names(repository: &str, expected: Option<&str>) {
    assert_eq!(repo_dir_name(repository).as_deref(), expected);
}

#[test]
fn workspace_dir_is_scoped_per_workspace() {
    let dir = derive_workspace_dir(Path::new("/srv/ws"), None, "ws-1");
    assert_eq!(dir, PathBuf::from("/srv/ws/ws-1"));
}

#[test]
fn legacy_single_workspace_uses_base_dir_itself() {
    let dir = derive_workspace_dir(Path::new("/srv/ws"), Some("ws-1"), "ws-1");
    assert_eq!(dir, PathBuf::from("/srv/ws"));

    let other = derive_workspace_dir(Path::new("/srv/ws"), Some("ws-1"), "ws-2");
    assert_eq!(other, PathBuf::from("/srv/ws/ws-2"));
}

#[test]
fn legacy_adoption_requires_existing_repo_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path();

    // No repo directory yet: nothing to adopt.
    assert_eq!(adopt_legacy_dir(base, "github.com/acme/app", ""), None);

    std::fs::create_dir(base.join("app")).unwrap();
    let adopted = adopt_legacy_dir(base, "github.com/acme/app", "");
    assert_eq!(adopted, Some(base.join("app")));

    // Current dir equal to the base directory also qualifies.
    let adopted =
        adopt_legacy_dir(base, "github.com/acme/app", &base.to_string_lossy());
    assert_eq!(adopted, Some(base.join("app")));

    // A real per-workspace dir does not get adopted over.
    let adopted = adopt_legacy_dir(base, "github.com/acme/app", "/srv/ws/ws-1");
    assert_eq!(adopted, None);
}

#[yare::parameterized(
    from_repo    = { "github.com/acme/app.git", "/srv/ws/ws-1", "/workspaces/app" },
    from_dir     = { "", "/srv/ws/ws-1", "/workspaces/ws-1" },
    both_empty   = { "", "", "/workspaces" },
)]
fn container_workdirs(repository: &str, workspace_dir: &str, expected: &str) {
    assert_eq!(container_workdir_for(repository, workspace_dir), expected);
}
