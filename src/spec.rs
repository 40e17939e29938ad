use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, LazyLock},
};

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, ErrorCode};

/// Method registry loaded from a spec document.
///
/// Immutable after load; share it with `Arc` and look methods up from any
/// number of tasks without locking.
#[derive(Debug)]
pub struct SpecRegistry {
    version: String,
    methods: HashMap<String, MethodSpec>,
}

/// Failure to load a spec document. This is a configuration error, raised
/// at startup, never during dispatch.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SpecError {
    #[error("spec document parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct SpecDocument {
    version: String,
    methods: HashMap<String, MethodSpec>,
}

/// What the spec document declares about one method.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodSpec {
    #[serde(default)]
    pub params: Option<Schema>,
    #[serde(default)]
    pub result: Option<Schema>,
    #[serde(default)]
    pub errors: Vec<i64>,
}

impl MethodSpec {
    pub fn declares_error(&self, code: ErrorCode) -> bool {
        self.errors.contains(&code.0)
    }
}

static BUNDLED: LazyLock<Arc<SpecRegistry>> = LazyLock::new(|| {
    Arc::new(
        SpecRegistry::from_str(include_str!("../spec/a2a.json"))
            .expect("bundled A2A spec document is valid"),
    )
});

impl SpecRegistry {
    pub fn from_str(doc: &str) -> Result<Self, SpecError> {
        let doc: SpecDocument = serde_json::from_str(doc)?;
        Ok(Self {
            version: doc.version,
            methods: doc.methods,
        })
    }

    /// The A2A spec document shipped with the crate.
    pub fn bundled() -> &'static SpecRegistry {
        &BUNDLED
    }
    /// [`bundled`](Self::bundled) behind an `Arc`, for attaching to a
    /// dispatcher.
    pub fn bundled_arc() -> Arc<SpecRegistry> {
        BUNDLED.clone()
    }

    pub fn version(&self) -> &str {
        &self.version
    }
    pub fn lookup(&self, method: &str) -> Option<&MethodSpec> {
        self.methods.get(method)
    }
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(|s| s.as_str())
    }

    /// Checks an inbound request against the registry.
    ///
    /// Unknown method maps to `-32601`, a parameter schema violation to
    /// `-32602` with the violation path in `data`.
    pub fn validate_request(&self, method: &str, params: Option<&Value>) -> crate::Result<()> {
        let Some(spec) = self.lookup(method) else {
            return Err(Error::method_not_found());
        };
        if let Some(schema) = &spec.params {
            schema
                .check(params.unwrap_or(&Value::Null))
                .map_err(Error::invalid_params)?;
        }
        Ok(())
    }
}

/// The JSON-Schema subset the A2A spec document uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    ty: Option<String>,
    #[serde(default)]
    properties: HashMap<String, Schema>,
    #[serde(default)]
    required: Vec<String>,
    items: Option<Box<Schema>>,
    #[serde(rename = "enum")]
    allowed: Option<Vec<Value>>,
    #[serde(rename = "additionalProperties")]
    additional: Option<bool>,
}

/// A schema check failure, with the JSONPath-style location it occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub reason: String,
}
impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

impl Schema {
    pub fn check(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.check_at(value, "$")
    }

    fn check_at(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        if let Some(ty) = &self.ty {
            if !type_matches(ty, value) {
                return Err(violation(
                    path,
                    format!("expected {ty}, got {}", type_name(value)),
                ));
            }
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                return Err(violation(path, "value is not one of the allowed values"));
            }
        }
        if let Value::Object(map) = value {
            for name in &self.required {
                if !map.contains_key(name) {
                    return Err(violation(
                        &format!("{path}.{name}"),
                        "required property is missing",
                    ));
                }
            }
            for (name, v) in map {
                if let Some(schema) = self.properties.get(name) {
                    schema.check_at(v, &format!("{path}.{name}"))?;
                } else if self.additional == Some(false) {
                    return Err(violation(
                        &format!("{path}.{name}"),
                        "property is not allowed",
                    ));
                }
            }
        }
        if let (Some(items), Value::Array(arr)) = (&self.items, value) {
            for (i, v) in arr.iter().enumerate() {
                items.check_at(v, &format!("{path}[{i}]"))?;
            }
        }
        Ok(())
    }
}

fn violation(path: &str, reason: impl Into<String>) -> SchemaViolation {
    SchemaViolation {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        // Unknown type names are not enforced.
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
