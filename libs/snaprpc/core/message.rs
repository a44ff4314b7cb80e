//! JSON-RPC 2.0 message shapes used on the wire
//!
//! Outbound we only ever send requests. Inbound a frame is either a reply to
//! one of our requests (has `id`, no `method`) or a server push (has
//! `method`, no `id`). Everything else is a protocol violation.

use crate::error::{Result, SnapError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound request
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<&'a Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }

    /// Serialize to a single line of JSON (without the trailing newline)
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            SnapError::ProtocolViolation(format!("failed to serialize {}: {}", self.method, e))
        })
    }
}

/// Error object carried by a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    #[serde(default = "default_error_code")]
    pub code: i64,
    #[serde(default = "default_error_message")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn default_error_code() -> i64 {
    -1
}

fn default_error_message() -> String {
    "Unknown error".to_string()
}

impl From<RpcError> for SnapError {
    fn from(err: RpcError) -> Self {
        SnapError::Remote {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Server-initiated message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Look up a string field in the params object (e.g. the client `id`)
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Reply to one of our requests
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub outcome: std::result::Result<Value, RpcError>,
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(Response),
    Notification(Notification),
    /// Frame matched no known shape; the string says why
    Invalid(String),
}

impl Inbound {
    /// Classify a decoded frame by the presence of `id` and `method`
    ///
    /// A `null` id counts as absent.
    pub fn classify(frame: Value) -> Self {
        let mut obj = match frame {
            Value::Object(obj) => obj,
            other => {
                return Inbound::Invalid(format!("expected a JSON object, got {}", type_name(&other)))
            }
        };

        let id = obj.remove("id").filter(|v| !v.is_null());
        let method = obj.remove("method");

        match (id, method) {
            (Some(id), None) => {
                let Some(id) = id.as_u64() else {
                    return Inbound::Invalid(format!("response id is not an unsigned integer: {}", id));
                };
                let outcome = match obj.remove("error").filter(|v| !v.is_null()) {
                    Some(error) => Err(serde_json::from_value::<RpcError>(error).unwrap_or_else(|e| {
                        RpcError {
                            code: default_error_code(),
                            message: format!("malformed error object: {}", e),
                            data: None,
                        }
                    })),
                    None => Ok(obj.remove("result").unwrap_or(Value::Null)),
                };
                Inbound::Response(Response { id, outcome })
            }
            (None, Some(Value::String(method))) => Inbound::Notification(Notification {
                method,
                params: obj.remove("params").unwrap_or(Value::Null),
            }),
            (None, Some(other)) => Inbound::Invalid(format!("method is not a string: {}", other)),
            (Some(_), Some(method)) => {
                Inbound::Invalid(format!("unexpected request from server: {}", method))
            }
            (None, None) => Inbound::Invalid("message has neither id nor method".to_string()),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
