// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{classify_status, CallbackError};

#[yare::parameterized(
    ok          = { 200, false, false },
    accepted    = { 202, false, false },
    bad_request = { 400, true, true },
    not_found   = { 404, true, true },
    timeout     = { 408, true, false },
    rate_limit  = { 429, true, false },
    server      = { 500, true, false },
    bad_gateway = { 502, true, false },
)]
fn status_classification(status: u16, is_err: bool, is_permanent: bool) {
    match classify_status(status) {
        None => assert!(!is_err, "{status} should be an error"),
        Some(err) => {
            assert!(is_err, "{status} should not be an error");
            assert_eq!(err.is_permanent(), is_permanent, "{status}");
        }
    }
}

#[test]
fn not_configured_is_permanent() {
    assert!(CallbackError::NotConfigured.is_permanent());
    assert!(!CallbackError::Network("x".into()).is_permanent());
}
