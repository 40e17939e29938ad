use std::fmt;

use derive_ex::derive_ex;
use ordered_float::OrderedFloat;
use parse_display::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::write_json_no_escape;
use crate::{Error, ErrorCode, Result, SessionError, SessionResult};


/// JSON-RPC request id.
///
/// The spec allows numbers and strings; fractional numbers are accepted on
/// decode for interoperability but never produced by this crate.
#[derive(Debug, Serialize, Deserialize, Clone, Display)]
#[derive_ex(Eq, PartialEq, Hash)]
#[serde(untagged)]
#[display("{0}")]
pub enum RequestId {
    Number(i64),
    Float(#[eq(key = OrderedFloat($))] f64),
    String(String),
}

const MAX_SAFE_INTEGER: u128 = 9007199254740991;

impl From<u128> for RequestId {
    fn from(id: u128) -> Self {
        if id <= MAX_SAFE_INTEGER {
            RequestId::Number(id as i64)
        } else {
            RequestId::String(id.to_string())
        }
    }
}
impl RequestId {
    /// Key used to match a response back to the outgoing request it answers.
    ///
    /// `None` means the id cannot have been issued by this session, which
    /// makes the response an orphan.
    pub(crate) fn as_correlation_key(&self) -> Option<u128> {
        match self {
            RequestId::Number(n) => {
                if *n >= 0 {
                    return Some(*n as u128);
                }
            }
            RequestId::Float(f) => {
                if f.fract() == 0.0 && *f >= 0.0 && *f <= MAX_SAFE_INTEGER as f64 {
                    return Some(*f as u128);
                }
            }
            RequestId::String(s) => {
                if let Ok(n) = s.parse() {
                    return Some(n);
                }
            }
        }
        None
    }
}

/// One wire unit: a single message or a JSON-RPC batch array.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageBatch {
    Single(RawMessage),
    Batch(Vec<RawMessage>),
}
impl MessageBatch {
    pub fn from_bytes(bytes: &[u8]) -> SessionResult<Self> {
        serde_json::from_slice(bytes).map_err(SessionError::deserialize)
    }
    pub fn to_bytes(&self) -> SessionResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(SessionError::serialize)
    }
}
impl IntoIterator for MessageBatch {
    type Item = RawMessage;
    type IntoIter = MessageBatchIter;
    fn into_iter(self) -> Self::IntoIter {
        match self {
            MessageBatch::Single(msg) => MessageBatchIter::One(Some(msg)),
            MessageBatch::Batch(vec) => MessageBatchIter::Many(vec.into_iter()),
        }
    }
}

pub enum MessageBatchIter {
    One(Option<RawMessage>),
    Many(std::vec::IntoIter<RawMessage>),
}
impl Iterator for MessageBatchIter {
    type Item = RawMessage;
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            MessageBatchIter::One(msg) => msg.take(),
            MessageBatchIter::Many(iter) => iter.next(),
        }
    }
}

/// Undifferentiated JSON-RPC envelope as it appears on the wire.
///
/// [`try_into_message`](Self::try_into_message) classifies it into one of the
/// four message kinds or rejects it.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RawMessage {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    // `result: null` is a legitimate success payload and must stay distinct
    // from an absent `result`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}
impl Default for RawMessage {
    fn default() -> Self {
        RawMessage {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RawMessage {
    pub fn from_result(id: Option<RequestId>, result: Result<Value, ErrorObject>) -> Self {
        let mut m = Self {
            id,
            ..Self::default()
        };
        match result {
            Ok(value) => m.result = Some(value),
            Err(e) => m.error = Some(e),
        }
        m
    }

    /// Envelope shape validation.
    ///
    /// Fails when the version tag is wrong, `result` and `error` are both
    /// present (or both absent on a message without a method), or `params`
    /// is not structured.
    pub fn try_into_message(self) -> Result<Message> {
        if self.jsonrpc != "2.0" {
            return Err(Error::new(ErrorCode::INVALID_REQUEST)
                .with_data(serde_json::json!({"jsonrpc": self.jsonrpc})));
        }
        if let Some(params) = &self.params {
            if !matches!(params, Value::Object(_) | Value::Array(_) | Value::Null) {
                return Err(Error::invalid_params("params must be structured"));
            }
        }
        match (self.id, self.method, self.result, self.error) {
            (Some(id), Some(method), None, None) => Ok(Message::Request(RequestMessage {
                id,
                method,
                params: self.params,
            })),
            (Some(id), None, Some(result), None) => {
                Ok(Message::Success(SuccessMessage { id, result }))
            }
            (Some(id), None, None, Some(error)) => Ok(Message::Error(ErrorMessage { id, error })),
            (None, Some(method), None, None) => Ok(Message::Notification(NotificationMessage {
                method,
                params: self.params,
            })),
            _ => Err(Error::new(ErrorCode::INVALID_REQUEST)),
        }
    }
}
impl From<RawMessage> for MessageBatch {
    fn from(msg: RawMessage) -> Self {
        MessageBatch::Single(msg)
    }
}

/// A classified JSON-RPC message.
#[derive(Debug, PartialEq)]
pub enum Message {
    Request(RequestMessage),
    Success(SuccessMessage),
    Error(ErrorMessage),
    Notification(NotificationMessage),
}

#[derive(Debug, PartialEq)]
pub struct RequestMessage {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}
#[derive(Debug, PartialEq)]
pub struct SuccessMessage {
    pub id: RequestId,
    pub result: Value,
}
#[derive(Debug, PartialEq)]
pub struct ErrorMessage {
    pub id: RequestId,
    pub error: ErrorObject,
}
#[derive(Debug, PartialEq)]
pub struct NotificationMessage {
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC error object as carried by an error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, " ")?;
            write_json_no_escape(data, f)?;
        }
        Ok(())
    }
}
