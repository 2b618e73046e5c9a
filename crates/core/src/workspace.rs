// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lifecycle status and the legal transition table.
//!
//! Status changes happen exclusively through compare-and-swap against an
//! expected set of source states; anything outside the table is an
//! `invalid_transition` conflict at the HTTP layer.

use serde::{Deserialize, Serialize};

/// Status of a workspace in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    /// Provisioning in progress (initial create, restart, or rebuild)
    #[default]
    Creating,
    /// Devcontainer up and serving
    Running,
    /// Serving from the host fallback because the devcontainer could not start
    Recovery,
    /// Stopped by explicit request
    Stopped,
    /// Provisioning failed
    Error,
}

crate::simple_display! {
    WorkspaceStatus {
        Creating => "creating",
        Running => "running",
        Recovery => "recovery",
        Stopped => "stopped",
        Error => "error",
    }
}

/// Source states from which `stop` is permitted.
pub const STOP_SOURCES: &[WorkspaceStatus] = &[
    WorkspaceStatus::Running,
    WorkspaceStatus::Recovery,
    WorkspaceStatus::Creating,
    WorkspaceStatus::Error,
];

/// Source states from which `restart` is permitted.
pub const RESTART_SOURCES: &[WorkspaceStatus] =
    &[WorkspaceStatus::Stopped, WorkspaceStatus::Error];

/// Source states from which `rebuild` is permitted.
pub const REBUILD_SOURCES: &[WorkspaceStatus] = &[
    WorkspaceStatus::Running,
    WorkspaceStatus::Recovery,
    WorkspaceStatus::Error,
];

impl WorkspaceStatus {
    /// Whether a direct transition `self -> next` appears in the table.
    ///
    /// Provisioning completion (`creating -> running|recovery|error`) and the
    /// operator verbs (stop/restart/rebuild) are the only legal moves.
    pub fn can_transition(self, next: WorkspaceStatus) -> bool {
        use WorkspaceStatus::*;
        match (self, next) {
            (Creating, Running) | (Creating, Recovery) | (Creating, Error) => true,
            (from, Stopped) => STOP_SOURCES.contains(&from),
            (from, Creating) => {
                RESTART_SOURCES.contains(&from) || REBUILD_SOURCES.contains(&from)
            }
            _ => false,
        }
    }

    /// Parse from the lowercase wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "creating" => Some(Self::Creating),
            "running" => Some(Self::Running),
            "recovery" => Some(Self::Recovery),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
