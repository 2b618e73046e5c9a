// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{AgentServerMessage, ErrorKind, TerminalClientMessage, TerminalServerMessage};

#[test]
fn terminal_client_messages_decode_from_browser_shapes() {
    let msg: TerminalClientMessage = serde_json::from_value(json!({
        "type": "create_session", "sessionId": "sess-1", "rows": 24, "cols": 80
    }))
    .unwrap();
    assert_eq!(
        msg,
        TerminalClientMessage::CreateSession {
            session_id: "sess-1".into(),
            rows: 24,
            cols: 80,
            work_dir: None,
        }
    );

    let msg: TerminalClientMessage =
        serde_json::from_value(json!({"type": "ping"})).unwrap();
    assert_eq!(msg, TerminalClientMessage::Ping);
}

#[test]
fn unknown_terminal_type_is_rejected() {
    let result: Result<TerminalClientMessage, _> =
        serde_json::from_value(json!({"type": "bogus"}));
    assert!(result.is_err());
}

#[test]
fn server_output_envelope_shape() {
    let out = TerminalServerMessage::Output {
        session_id: "sess-1".into(),
        data: "hello".into(),
    };
    let value = serde_json::to_value(&out).unwrap();
    assert_eq!(value, json!({"type": "output", "sessionId": "sess-1", "data": "hello"}));
}

#[test]
fn session_not_running_error_code() {
    let value = serde_json::to_value(AgentServerMessage::session_not_running()).unwrap();
    assert_eq!(value, json!({"type": "error", "code": "session_not_running"}));
}

#[yare::parameterized(
    validation   = { ErrorKind::Validation, 400 },
    unauthorized = { ErrorKind::Unauthorized, 401 },
    forbidden    = { ErrorKind::Forbidden, 403 },
    not_found    = { ErrorKind::NotFound, 404 },
    conflict     = { ErrorKind::Conflict, 409 },
    too_large    = { ErrorKind::PayloadTooLarge, 413 },
    internal     = { ErrorKind::Internal, 500 },
    bad_gateway  = { ErrorKind::BadGateway, 502 },
    unavailable  = { ErrorKind::Unavailable, 503 },
)]
fn error_kind_status_codes(kind: ErrorKind, code: u16) {
    assert_eq!(kind.status_code(), code);
}
