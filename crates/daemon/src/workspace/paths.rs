// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace directory and container path derivation.

use std::path::{Path, PathBuf};

/// Restrict a workspace id to filesystem-safe characters.
pub fn sanitize_workspace_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .collect()
}

/// Directory name a repository clones into: last path segment, `.git` stripped.
pub fn repo_dir_name(repository: &str) -> Option<String> {
    let trimmed = repository.trim_end_matches('/');
    let last = trimmed.rsplit('/').next()?.trim_end_matches(".git");
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

/// Host directory for a workspace: `base_dir/<sanitized id>`, except the
/// legacy single-workspace case where the configured workspace id matches
/// and `base_dir` itself is used.
pub fn derive_workspace_dir(
    base_dir: &Path,
    configured_workspace_id: Option<&str>,
    workspace_id: &str,
) -> PathBuf {
    if configured_workspace_id == Some(workspace_id) {
        base_dir.to_path_buf()
    } else {
        base_dir.join(sanitize_workspace_id(workspace_id))
    }
}

/// One-time legacy adoption: a directory named after the repository already
/// sitting at the base directory is adopted as the workspace dir when the
/// recovering runtime has no better answer (its recorded dir is the base
/// directory itself, or missing).
pub fn adopt_legacy_dir(
    base_dir: &Path,
    repository: &str,
    current_dir: &str,
) -> Option<PathBuf> {
    let repo_dir = repo_dir_name(repository)?;
    let candidate = base_dir.join(&repo_dir);
    let current_is_base = current_dir.is_empty() || Path::new(current_dir) == base_dir;
    if current_is_base && candidate.is_dir() {
        Some(candidate)
    } else {
        None
    }
}

/// In-container working directory: `/workspaces/<repoDirName>` when a
/// repository is known, else `/workspaces/<basename(workspace_dir)>`,
/// falling back to `/workspaces` when both are empty.
pub fn container_workdir_for(repository: &str, workspace_dir: &str) -> String {
    if let Some(repo_dir) = repo_dir_name(repository) {
        return format!("/workspaces/{repo_dir}");
    }
    let base = Path::new(workspace_dir)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() {
        "/workspaces".to_string()
    } else {
        format!("/workspaces/{base}")
    }
}

/// Host directory fallback when no directory can be derived at all.
pub const WORKSPACE_DIR_FALLBACK: &str = "/workspace";

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
