use std::any::Any;
use std::fmt;

use serde_json::Value;

pub(crate) fn downcast<T: 'static, S: 'static>(value: S) -> Result<T, S> {
    let mut value = Some(value);
    if let Some(value) = <dyn Any>::downcast_mut::<Option<T>>(&mut value) {
        Ok(value.take().unwrap())
    } else {
        Err(value.unwrap())
    }
}

/// Writes a JSON value without escaping string contents.
///
/// Used when formatting error data for humans; `data` frequently carries
/// multi-line text such as backtraces that must stay readable.
pub(crate) fn write_json_no_escape(value: &Value, f: &mut fmt::Formatter) -> fmt::Result {
    match value {
        Value::Null => write!(f, "null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "{s}"),
        Value::Array(arr) => {
            write!(f, "[")?;
            let mut first = true;
            for item in arr {
                if !first {
                    write!(f, ",")?;
                }
                first = false;
                write_json_no_escape(item, f)?;
            }
            write!(f, "]")
        }
        Value::Object(obj) => {
            write!(f, "{{")?;
            let mut first = true;
            for (key, value) in obj {
                if !first {
                    write!(f, ",")?;
                }
                first = false;
                write!(f, "{key}:")?;
                write_json_no_escape(value, f)?;
            }
            write!(f, "}}")
        }
    }
}
