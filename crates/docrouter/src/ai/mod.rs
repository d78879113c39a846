//! AI capability interface.
//!
//! Classification, extraction and validation are all delegated to an external
//! document-AI service. The pipeline only sees the two traits below, so tests
//! can substitute deterministic fakes and production wires in [`HttpAiProvider`].

pub mod error;
pub mod http;

#[cfg(test)]
pub(crate) mod fakes;

use serde::Serialize;
use serde_json::{Map, Value};

pub use error::AiError;
pub use http::{HttpAiConfig, HttpAiProvider};

/// One target of an extraction call: the key to fill and the instruction for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub instruction: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
        }
    }
}

/// A staged document handed to the extraction capability.
#[derive(Debug, Clone, Copy)]
pub struct DocumentInput<'a> {
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub content: &'a [u8],
}

/// File + ordered `(name, instruction)` list → structured mapping.
pub trait ExtractionCapability: Send + Sync {
    fn extract(
        &self,
        document: &DocumentInput<'_>,
        fields: &[FieldSpec],
    ) -> Result<Map<String, Value>, AiError>;
}

/// A structured completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    /// JSON Schema the provider is asked to conform its output to.
    pub output_schema: Value,
}

/// Prompt + output schema + sampling parameters → structured object.
///
/// Providers are not trusted to honour the schema; callers get whatever
/// came back.
pub trait CompletionCapability: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<Value, AiError>;
}

/// Strips the `{"response": ...}` envelope providers wrap payloads in.
pub fn unwrap_response(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("response") => {
            map.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Parses a payload delivered as a JSON-encoded string; anything else is returned untouched.
pub fn decode_string_payload(value: Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}
