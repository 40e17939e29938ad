use std::{
    backtrace::{Backtrace, BacktraceStatus},
    borrow::Cow,
    fmt,
    sync::Arc,
};

use parse_display::Display;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ErrorObject;
use crate::utils::downcast;

/// JSON-RPC error code.
///
/// Standard codes are associated constants; the A2A-specific block lives in
/// [`crate::a2a`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{0}")]
pub struct ErrorCode(pub i64);

impl ErrorCode {
    pub const PARSE_ERROR: Self = Self(-32700);
    pub const INVALID_REQUEST: Self = Self(-32600);
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    pub const INVALID_PARAMS: Self = Self(-32602);
    pub const INTERNAL_ERROR: Self = Self(-32603);
    pub const SERVER_ERROR_START: Self = Self(-32099);
    pub const SERVER_ERROR_END: Self = Self(-32000);

    /// Catalog message for this code.
    pub fn message(self) -> &'static str {
        match self {
            Self::PARSE_ERROR => "Parse error",
            Self::INVALID_REQUEST => "Invalid request",
            Self::METHOD_NOT_FOUND => "Method not found",
            Self::INVALID_PARAMS => "Invalid params",
            Self::INTERNAL_ERROR => "Internal error",
            _ => crate::a2a::error_message(self).unwrap_or("Server error"),
        }
    }

    pub fn is_server_error(self) -> bool {
        Self::SERVER_ERROR_START.0 <= self.0 && self.0 <= Self::SERVER_ERROR_END.0
    }
}

/// Error raised by request handlers, converted into a JSON-RPC error
/// response at the dispatch boundary.
///
/// Messages and data set through [`Error::new`], [`Error::public`] or
/// [`bail_public!`](crate::bail_public) are sent to the peer verbatim.
/// Everything converted in from a source error (the blanket `From`,
/// [`Error::msg`], [`bail!`](crate::bail)) is treated as internal detail
/// and redacted unless the session exposes internals.
pub struct Error(Box<ErrorData>);

struct ErrorData {
    code: ErrorCode,
    message: Option<Cow<'static, str>>,
    data: Option<Value>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn new(code: ErrorCode) -> Self {
        Self::public(code, code.message())
    }
    pub fn public(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self(Box::new(ErrorData {
            code,
            message: Some(message.into()),
            data: None,
            source: None,
            backtrace: Backtrace::capture(),
        }))
    }
    /// Internal error carrying a private message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::from_source(
            ErrorCode::INTERNAL_ERROR,
            Arc::new(MessageError(message.to_string())),
        )
    }
    fn from_source(code: ErrorCode, source: Arc<dyn std::error::Error + Send + Sync>) -> Self {
        Self(Box::new(ErrorData {
            code,
            message: None,
            data: None,
            source: Some(source),
            backtrace: Backtrace::capture(),
        }))
    }
    pub fn from_error_object(e: ErrorObject) -> Self {
        let mut this = Self::public(e.code, e.message);
        this.0.data = e.data;
        this
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::METHOD_NOT_FOUND)
    }
    pub fn invalid_params(reason: impl fmt::Display) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS).with_data(json!({"reason": reason.to_string()}))
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.0.data = Some(data);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.0.code
    }
    pub fn backtrace(&self) -> &Backtrace {
        &self.0.backtrace
    }

    /// Converts into the wire error object.
    ///
    /// With `expose_internals` the source chain and backtrace travel in
    /// `data`; without it only the catalog message for the code is sent.
    pub fn to_error_object(&self, expose_internals: bool) -> ErrorObject {
        let d = &*self.0;
        if let Some(message) = &d.message {
            return ErrorObject {
                code: d.code,
                message: message.clone().into_owned(),
                data: d.data.clone(),
            };
        }
        if expose_internals {
            if let Some(source) = &d.source {
                let mut data = serde_json::Map::new();
                data.insert("source".to_string(), Value::String(source.to_string()));
                if d.backtrace.status() == BacktraceStatus::Captured {
                    data.insert(
                        "backtrace".to_string(),
                        Value::String(format!("{:#?}", d.backtrace)),
                    );
                }
                return ErrorObject {
                    code: d.code,
                    message: source.to_string(),
                    data: Some(Value::Object(data)),
                };
            }
        }
        ErrorObject {
            code: d.code,
            message: d.code.message().to_string(),
            data: None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &*self.0;
        if let Some(message) = &d.message {
            write!(f, "{message} ({})", d.code)
        } else if let Some(source) = &d.source {
            write!(f, "{source} ({})", d.code)
        } else {
            write!(f, "{} ({})", d.code.message(), d.code)
        }
    }
}
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("code", &self.0.code)
            .field("message", &self.0.message)
            .field("data", &self.0.data)
            .field("source", &self.0.source)
            .finish_non_exhaustive()
    }
}

// Deliberately not `std::error::Error`: that keeps the blanket conversion
// below legal, so handlers can use `?` on any error type.
impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(e: E) -> Self {
        // A forwarded peer error keeps its code and message.
        let e = match downcast::<SessionError, E>(e) {
            Ok(se) => return se.into_error(),
            Err(e) => e,
        };
        Self::from_source(ErrorCode::INTERNAL_ERROR, Arc::new(e))
    }
}

#[derive(Debug)]
struct MessageError(String);
impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::error::Error for MessageError {}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Session-fatal failures and terminal request outcomes.
///
/// Unlike [`Error`] these never turn into responses; they surface to the
/// local caller through [`Session::request`](crate::Session::request) and
/// [`Session::wait`](crate::Session::wait).
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("serialize error: {0}")]
    Serialize(Arc<serde_json::Error>),
    #[error("deserialize error: {0}")]
    Deserialize(Arc<serde_json::Error>),
    #[error("outgoing request id space exhausted")]
    RequestIdOverflow,
    #[error("request timed out before a response arrived")]
    RequestTimeout,
    #[error("session is shut down")]
    Shutdown,
    #[error("error response: {0}")]
    ErrorObject(ErrorObject),
}

impl SessionError {
    pub(crate) fn serialize(e: serde_json::Error) -> Self {
        Self::Serialize(Arc::new(e))
    }
    pub(crate) fn deserialize(e: serde_json::Error) -> Self {
        Self::Deserialize(Arc::new(e))
    }
    pub(crate) fn into_error(self) -> Error {
        match self {
            SessionError::ErrorObject(e) => Error::from_error_object(e),
            e => Error::from_source(ErrorCode::INTERNAL_ERROR, Arc::new(e)),
        }
    }
    /// The error object if this is a peer error response.
    pub fn error_object(&self) -> Option<&ErrorObject> {
        match self {
            SessionError::ErrorObject(e) => Some(e),
            _ => None,
        }
    }
}
impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}
impl From<ErrorObject> for SessionError {
    fn from(e: ErrorObject) -> Self {
        Self::ErrorObject(e)
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Returns an internal error from a handler; the message is redacted from
/// the peer unless the session exposes internals.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return ::std::result::Result::Err($crate::Error::msg(::std::format!($($arg)*)))
    };
}

/// Returns an error whose message is sent to the peer. The first argument is
/// the error code, or `_` for `-32603`.
#[macro_export]
macro_rules! bail_public {
    (_, $($arg:tt)*) => {
        return ::std::result::Result::Err($crate::Error::public(
            $crate::ErrorCode::INTERNAL_ERROR,
            ::std::format!($($arg)*),
        ))
    };
    ($code:expr, $($arg:tt)*) => {
        return ::std::result::Result::Err($crate::Error::public($code, ::std::format!($($arg)*)))
    };
}
