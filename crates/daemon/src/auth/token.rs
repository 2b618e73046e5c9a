// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JWT validation seam.
//!
//! Key rotation and JWKS handling live outside the daemon; the core depends
//! on this trait only. The default implementation verifies HS256 against
//! the configured shared secrets.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from token validation.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    Invalid,

    #[error("token validation not configured")]
    NotConfigured,
}

/// Claims the daemon consumes. `workspace` scopes a token to one workspace;
/// management tokens may omit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    pub exp: u64,
}

/// Validation seam for the two JWT families.
pub trait TokenValidator: Send + Sync {
    fn validate_management(&self, token: &str) -> Result<Claims, AuthError>;
    fn validate_workspace(&self, token: &str) -> Result<Claims, AuthError>;
}

/// HS256 validator over shared secrets.
pub struct JwtValidator {
    management: Option<DecodingKey>,
    workspace: Option<DecodingKey>,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(management_secret: Option<&str>, workspace_secret: Option<&str>) -> Self {
        Self {
            management: management_secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            workspace: workspace_secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    fn validate(&self, key: &Option<DecodingKey>, token: &str) -> Result<Claims, AuthError> {
        let key = key.as_ref().ok_or(AuthError::NotConfigured)?;
        decode::<Claims>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::Invalid)
    }
}

impl TokenValidator for JwtValidator {
    fn validate_management(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate(&self.management, token)
    }

    fn validate_workspace(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate(&self.workspace, token)
    }
}
