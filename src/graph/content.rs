//! Request body serialization

use crate::error::{GraphError, Result};
use serde_json::Value;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Transport-ready body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBody {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl PreparedBody {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

/// Caller-supplied request content
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Structured content: objects become JSON, strings go out as-is,
    /// null means no body
    Value(Value),
    /// Already a transport-level body, sent byte for byte
    Prebuilt(PreparedBody),
}

impl Content {
    pub fn json(value: Value) -> Self {
        Self::Value(value)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Value(Value::String(text.into()))
    }

    pub fn prebuilt(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self::Prebuilt(PreparedBody::new(bytes, content_type))
    }
}

/// Turn content into the bytes to send, or `None` for no body
pub fn serialize(content: &Content) -> Result<Option<PreparedBody>> {
    match content {
        Content::Prebuilt(body) => Ok(Some(body.clone())),
        Content::Value(Value::Null) => Ok(None),
        Content::Value(Value::String(text)) => Ok(Some(PreparedBody::new(
            text.as_bytes(),
            Some(JSON_CONTENT_TYPE),
        ))),
        Content::Value(object @ Value::Object(_)) => {
            let bytes = serde_json::to_vec(object).map_err(|e| {
                GraphError::UnsupportedContentType(format!("object is not serializable: {}", e))
            })?;
            Ok(Some(PreparedBody::new(bytes, Some(JSON_CONTENT_TYPE))))
        }
        Content::Value(other) => Err(GraphError::UnsupportedContentType(format!(
            "expected an object, a string or null, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
