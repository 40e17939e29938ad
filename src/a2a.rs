//! A2A protocol binding: method names, the A2A error-code block, and
//! constructors for the errors an agent reports.

use serde_json::json;

use crate::{Error, ErrorCode};

/// Method names defined by the A2A spec document.
pub mod methods {
    pub const MESSAGE_SEND: &str = "message/send";
    pub const TASKS_GET: &str = "tasks/get";
    pub const TASKS_CANCEL: &str = "tasks/cancel";
    pub const TASKS_SEND_SUBSCRIBE: &str = "tasks/sendSubscribe";
    pub const TASKS_RESUBSCRIBE: &str = "tasks/resubscribe";
    pub const TASKS_PUSH_NOTIFICATION_SET: &str = "tasks/pushNotification/set";
    pub const TASKS_PUSH_NOTIFICATION_GET: &str = "tasks/pushNotification/get";
}

pub const TASK_NOT_FOUND: ErrorCode = ErrorCode(-32001);
pub const TASK_NOT_CANCELABLE: ErrorCode = ErrorCode(-32002);
pub const PUSH_NOTIFICATIONS_NOT_SUPPORTED: ErrorCode = ErrorCode(-32003);
pub const UNSUPPORTED_OPERATION: ErrorCode = ErrorCode(-32004);
pub const CONTENT_TYPE_NOT_SUPPORTED: ErrorCode = ErrorCode(-32005);
pub const INVALID_AGENT_RESPONSE: ErrorCode = ErrorCode(-32006);
pub const AUTHENTICATED_EXTENDED_CARD_NOT_CONFIGURED: ErrorCode = ErrorCode(-32007);

pub(crate) fn error_message(code: ErrorCode) -> Option<&'static str> {
    Some(match code {
        TASK_NOT_FOUND => "Task not found",
        TASK_NOT_CANCELABLE => "Task cannot be canceled",
        PUSH_NOTIFICATIONS_NOT_SUPPORTED => "Push notifications are not supported",
        UNSUPPORTED_OPERATION => "This operation is not supported",
        CONTENT_TYPE_NOT_SUPPORTED => "Content type is not supported",
        INVALID_AGENT_RESPONSE => "Agent returned an invalid response",
        AUTHENTICATED_EXTENDED_CARD_NOT_CONFIGURED => {
            "Authenticated extended card is not configured"
        }
        _ => return None,
    })
}

pub fn task_not_found(task_id: &str) -> Error {
    Error::new(TASK_NOT_FOUND).with_data(json!({"id": task_id}))
}
pub fn task_not_cancelable(task_id: &str) -> Error {
    Error::new(TASK_NOT_CANCELABLE).with_data(json!({"id": task_id}))
}
pub fn push_notifications_not_supported() -> Error {
    Error::new(PUSH_NOTIFICATIONS_NOT_SUPPORTED)
}
pub fn unsupported_operation(operation: &str) -> Error {
    Error::new(UNSUPPORTED_OPERATION).with_data(json!({"operation": operation}))
}
pub fn content_type_not_supported(content_type: &str) -> Error {
    Error::new(CONTENT_TYPE_NOT_SUPPORTED).with_data(json!({"contentType": content_type}))
}
pub fn invalid_agent_response(reason: &str) -> Error {
    Error::new(INVALID_AGENT_RESPONSE).with_data(json!({"reason": reason}))
}
pub fn authenticated_extended_card_not_configured() -> Error {
    Error::new(AUTHENTICATED_EXTENDED_CARD_NOT_CONFIGURED)
}
