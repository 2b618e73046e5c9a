// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error type shared by every handler.
//!
//! Each variant carries the user-facing message and maps to the fixed status
//! code of its kind; the body is always `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use sam_wire::{ErrorBody, ErrorKind};

/// Error returned from HTTP handlers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            Self::Internal(_) => ErrorKind::Internal,
            Self::BadGateway(_) => ErrorKind::BadGateway,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// 409 emitted when a CAS against the workspace status table fails.
    pub fn invalid_transition() -> Self {
        Self::Conflict("invalid_transition".to_string())
    }

    /// 400 emitted when no workspace routing can be established.
    pub fn workspace_required() -> Self {
        Self::Validation("workspace_required".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

impl From<sam_storage::StoreError> for ApiError {
    fn from(e: sam_storage::StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}
