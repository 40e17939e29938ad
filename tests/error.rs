use std::{
    backtrace::BacktraceStatus,
    fmt::{self, Display},
};

use a2a_json_rpc::{Error, ErrorCode, SessionError};

#[derive(Debug)]
struct DetailedError;

impl std::error::Error for DetailedError {}

impl Display for DetailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DetailedError")
    }
}

#[test]
fn expose_internals_false() {
    let e = Error::from(DetailedError);
    let eo = e.to_error_object(false);
    assert_eq!(eo.code, ErrorCode::INTERNAL_ERROR);
    assert_eq!(eo.message, ErrorCode::INTERNAL_ERROR.message());
    assert_eq!(eo.data, None);
}

#[test]
fn expose_internals_false_session_error() {
    let e = Error::from(DetailedError);
    let eo = e.to_error_object(false);
    let se = SessionError::from(eo);
    let se_str = se.to_string();

    assert!(!se_str.contains("DetailedError"));
}

#[test]
fn expose_internals_true() {
    let e = Error::from(DetailedError);
    let eo = e.to_error_object(true);
    assert_eq!(eo.code, ErrorCode::INTERNAL_ERROR);
    assert_eq!(eo.message, "DetailedError");
    assert!(eo.data.is_some());
    let data = eo.data.unwrap();
    assert_eq!(data["source"], "DetailedError", "source");
}

#[test]
fn expose_internals_true_session_error() {
    let e = Error::from(DetailedError);
    let eo = e.to_error_object(true);
    let se = SessionError::from(eo);
    let se_str = se.to_string();
    assert!(se_str.contains("DetailedError"), "SessionError = {se_str}");
    if e.backtrace().status() == BacktraceStatus::Captured {
        assert!(
            se_str.contains(&format!("{:#?}", e.backtrace())),
            "SessionError = {se_str}"
        );
    }
}

#[test]
fn public_message_survives_redaction() {
    let e = Error::public(a2a_json_rpc::a2a::TASK_NOT_FOUND, "task gone");
    let eo = e.to_error_object(false);
    assert_eq!(eo.code, a2a_json_rpc::a2a::TASK_NOT_FOUND);
    assert_eq!(eo.message, "task gone");
}

#[test]
fn catalog_messages_cover_a2a_block() {
    assert_eq!(a2a_json_rpc::a2a::TASK_NOT_FOUND.message(), "Task not found");
    assert_eq!(
        a2a_json_rpc::a2a::TASK_NOT_CANCELABLE.message(),
        "Task cannot be canceled"
    );
    assert_eq!(ErrorCode(-32050).message(), "Server error");
}

#[test]
fn forwarded_peer_error_keeps_its_code() {
    let se = SessionError::from(a2a_json_rpc::ErrorObject {
        code: a2a_json_rpc::a2a::TASK_NOT_FOUND,
        message: "Task not found".to_string(),
        data: None,
    });
    let e = Error::from(se);
    assert_eq!(e.code(), a2a_json_rpc::a2a::TASK_NOT_FOUND);
    assert_eq!(e.to_error_object(false).message, "Task not found");
}

#[test]
fn invalid_params_carries_reason() {
    let e = Error::invalid_params("$.id: expected string");
    let eo = e.to_error_object(false);
    assert_eq!(eo.code, ErrorCode::INVALID_PARAMS);
    assert_eq!(eo.data.unwrap()["reason"], "$.id: expected string");
}
