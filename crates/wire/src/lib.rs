// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the SAM node daemon.
//!
//! WebSocket envelopes (terminal multiplexer, agent viewer, boot log) and
//! the HTTP request/response bodies. All WebSocket messages share a small
//! tagged envelope dispatched over `type`; no untyped maps in the core.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod agent;
mod error;
mod http;
mod terminal;

pub use agent::{AgentClientMessage, AgentServerMessage};
pub use error::{ErrorBody, ErrorKind};
pub use http::{
    AgentSessionView, CreateAgentSessionRequest, CreateWorkspaceRequest,
    CreateWorkspaceResponse, EventsResponse, HealthResponse, HealthWorkspace,
    StartAgentSessionRequest, StatusResponse, TabsResponse, WorkspaceListResponse,
    WorkspaceSummary,
};
pub use terminal::{TerminalClientMessage, TerminalServerMessage, TerminalSessionInfo};

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod envelope_tests;
