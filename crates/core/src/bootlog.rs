// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot-log entries streamed while a workspace provisions or recovers.

use serde::{Deserialize, Serialize};

/// Entry type: ordinary log line or the terminal completion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootLogEntryType {
    Log,
    Complete,
}

crate::simple_display! {
    BootLogEntryType {
        Log => "log",
        Complete => "complete",
    }
}

/// One provisioning log entry.
///
/// `timestamp` is UTC RFC3339, stamped by the broadcaster at append time so
/// buffered catch-up and live delivery carry identical payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootLogEntry {
    #[serde(rename = "type")]
    pub entry_type: BootLogEntryType,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub step: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub detail: serde_json::Value,
    pub timestamp: String,
}

impl BootLogEntry {
    /// The sticky completion entry sent to late joiners.
    pub fn complete(timestamp: String) -> Self {
        Self {
            entry_type: BootLogEntryType::Complete,
            step: String::new(),
            status: String::new(),
            message: String::new(),
            detail: serde_json::Value::Null,
            timestamp,
        }
    }
}
