//! Picks one registered document type for a file, or `NO_MATCH`.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use crate::ai::{AiError, DocumentInput, ExtractionCapability, FieldSpec};
use crate::registry::NO_MATCH;

/// Key the classification answer is requested under.
pub const CLASSIFICATION_FIELD: &str = "document_type";

/// Instruction sent with the single classification field.
pub fn classification_instruction(vocabulary: &[String]) -> String {
    format!(
        "Classify this document as exactly one of the following types: {}. \
         If none of them applies, answer {}. Answer with the type name only.",
        vocabulary.join(", "),
        NO_MATCH
    )
}

/// Maps a raw provider answer onto the vocabulary.
///
/// The answer is trimmed and uppercased, then compared case-insensitively
/// with each registered name; the registered spelling wins. Anything that
/// is not a registered name becomes `NO_MATCH`.
pub fn resolve_label(answer: Option<&Value>, vocabulary: &[String]) -> String {
    let raw = match answer {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(items)) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let Some(label) = raw.map(|s| s.trim().to_uppercase()) else {
        return NO_MATCH.to_string();
    };
    if label.is_empty() || label == NO_MATCH {
        return NO_MATCH.to_string();
    }

    match vocabulary.iter().find(|name| name.to_uppercase() == label) {
        Some(name) => name.clone(),
        None => {
            warn!("Classifier answered '{}', which is not a registered type", label);
            NO_MATCH.to_string()
        }
    }
}

#[derive(Clone)]
pub struct Classifier {
    capability: Arc<dyn ExtractionCapability>,
}

impl Classifier {
    pub fn new(capability: Arc<dyn ExtractionCapability>) -> Self {
        Self { capability }
    }

    /// One extraction call with a single field; an empty vocabulary makes no call.
    pub fn classify(
        &self,
        document: &DocumentInput<'_>,
        vocabulary: &[String],
    ) -> Result<String, AiError> {
        if vocabulary.is_empty() {
            debug!("No document types registered; {} is unclassifiable", document.file_name);
            return Ok(NO_MATCH.to_string());
        }

        let field = FieldSpec::new(CLASSIFICATION_FIELD, classification_instruction(vocabulary));
        let reply = self.capability.extract(document, std::slice::from_ref(&field))?;
        Ok(resolve_label(reply.get(CLASSIFICATION_FIELD), vocabulary))
    }
}
