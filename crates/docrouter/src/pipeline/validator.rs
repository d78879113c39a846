//! Second-opinion check of an extraction by a structured completion call.

use std::fmt::Write;
use std::sync::Arc;

use log::warn;
use serde_json::{json, Value};

use crate::ai::{AiError, CompletionCapability, CompletionRequest};
use crate::db::record_repo::ValidationState;
use crate::registry::FieldSchema;

pub const SKIP_REASON_NO_MATCH: &str = "Document did not match a configured document type";
pub const SKIP_REASON_NO_FIELDS: &str = "No field prompts are configured for this document type";

/// The `{status: "skipped", reason}` marker stored when validation does not apply.
pub fn skip_marker(reason: &str) -> Value {
    json!({ "status": "skipped", "reason": reason })
}

/// Output schema requested from the completion provider.
pub fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "valid": { "type": "boolean" },
            "notes": { "type": "string" }
        },
        "required": ["valid", "notes"],
        "additionalProperties": false
    })
}

fn verdict_conforms(value: &Value) -> bool {
    match jsonschema::validator_for(&verdict_schema()) {
        Ok(validator) => validator.is_valid(value),
        Err(e) => {
            warn!("Verdict schema failed to compile: {}", e);
            true
        }
    }
}

/// Renders the validation prompt: type, description, ordered fields, extracted JSON.
pub fn render_prompt(schema: &FieldSchema, extracted: &Value) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are reviewing fields that were automatically extracted from a document.\n\n",
    );
    let _ = writeln!(prompt, "Document type: {}", schema.document_type);
    if !schema.description.is_empty() {
        let _ = writeln!(prompt, "Type description: {}", schema.description);
    }
    prompt.push_str("\nExpected fields, in order:\n");
    for field in &schema.fields {
        let _ = writeln!(prompt, "- {}: {}", field.name, field.instruction);
    }
    let rendered = serde_json::to_string_pretty(extracted).unwrap_or_else(|_| extracted.to_string());
    let _ = writeln!(prompt, "\nExtracted values (JSON):\n{}", rendered);
    prompt.push_str(
        "\nDecide whether the extraction is complete and plausible for this document type. \
         Set \"valid\" to true only if every expected field is present with a sensible value, \
         and explain any problem in \"notes\".",
    );
    prompt
}

/// Outcome of the validation step.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Not applicable; holds the skip marker.
    Skipped(Value),
    /// Provider verdict, stored verbatim.
    Verdict(Value),
}

impl Validation {
    pub fn as_json(&self) -> &Value {
        match self {
            Validation::Skipped(v) | Validation::Verdict(v) => v,
        }
    }

    pub fn state(&self) -> ValidationState {
        match self {
            Validation::Skipped(_) => ValidationState::Skipped,
            Validation::Verdict(_) => ValidationState::Complete,
        }
    }
}

#[derive(Clone)]
pub struct Validator {
    capability: Arc<dyn CompletionCapability>,
    temperature: f32,
}

impl Validator {
    pub fn new(capability: Arc<dyn CompletionCapability>, temperature: f32) -> Self {
        Self {
            capability,
            temperature,
        }
    }

    pub fn validate(&self, schema: &FieldSchema, extracted: &Value) -> Result<Validation, AiError> {
        if schema.is_no_match() {
            return Ok(Validation::Skipped(skip_marker(SKIP_REASON_NO_MATCH)));
        }
        if schema.fields.is_empty() {
            return Ok(Validation::Skipped(skip_marker(SKIP_REASON_NO_FIELDS)));
        }

        let request = CompletionRequest {
            prompt: render_prompt(schema, extracted),
            temperature: self.temperature,
            output_schema: verdict_schema(),
        };
        let verdict = self.capability.complete(&request)?;

        if !verdict_conforms(&verdict) {
            warn!(
                "Validator output for {} does not match the verdict schema; storing as-is",
                schema.document_type
            );
        }
        Ok(Validation::Verdict(verdict))
    }
}
