// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types for workspaces, sessions, and users.
//!
//! Workspace and session ids are supplied by callers (the control plane and
//! the browser respectively), so these are plain string newtypes rather than
//! generated ids.

crate::string_id! {
    /// Unique identifier for a workspace on this node.
    pub struct WorkspaceId
}

crate::string_id! {
    /// Client-supplied identifier for a PTY or agent session.
    ///
    /// Scoped to one workspace; the same id may exist under two different
    /// workspaces without conflict.
    pub struct SessionId
}

crate::string_id! {
    /// Identifier of the authenticated user owning a session.
    pub struct UserId
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
