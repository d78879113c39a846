//! Pulls the configured fields out of a classified file.

use std::sync::Arc;

use log::debug;
use serde_json::{json, Map, Value};

use crate::ai::{AiError, DocumentInput, ExtractionCapability};
use crate::registry::FieldSchema;

/// Warning stored when a type has no field prompts.
pub const NO_PROMPTS_WARNING: &str = "NO_PROMPTS_CONFIGURED";

/// Outcome of the extraction step.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The file matched no registered type; nothing was extracted.
    NoMatch,
    /// The type has no field prompts; nothing was extracted.
    NotConfigured,
    /// Provider answer, field name → value. Values are not schema-checked.
    Fields(Map<String, Value>),
}

impl Extraction {
    /// The value stored as the record's `extract_json`.
    pub fn to_json(&self) -> Value {
        match self {
            Extraction::NoMatch => Value::Object(Map::new()),
            Extraction::NotConfigured => json!({ "warning": NO_PROMPTS_WARNING }),
            Extraction::Fields(map) => Value::Object(map.clone()),
        }
    }

    pub fn called_provider(&self) -> bool {
        matches!(self, Extraction::Fields(_))
    }
}

#[derive(Clone)]
pub struct Extractor {
    capability: Arc<dyn ExtractionCapability>,
}

impl Extractor {
    pub fn new(capability: Arc<dyn ExtractionCapability>) -> Self {
        Self { capability }
    }

    pub fn extract(
        &self,
        document: &DocumentInput<'_>,
        schema: &FieldSchema,
    ) -> Result<Extraction, AiError> {
        if schema.is_no_match() {
            return Ok(Extraction::NoMatch);
        }
        if schema.fields.is_empty() {
            debug!("{} has no field prompts, skipping extraction", schema.document_type);
            return Ok(Extraction::NotConfigured);
        }

        let fields = self.capability.extract(document, &schema.fields)?;
        Ok(Extraction::Fields(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::FieldSpec;
    use crate::registry::NO_MATCH;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExtraction {
        calls: AtomicUsize,
    }

    impl ExtractionCapability for CountingExtraction {
        fn extract(
            &self,
            _document: &DocumentInput<'_>,
            fields: &[FieldSpec],
        ) -> Result<Map<String, Value>, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(fields
                .iter()
                .map(|f| (f.name.clone(), json!(format!("value of {}", f.name))))
                .collect())
        }
    }

    fn document() -> DocumentInput<'static> {
        DocumentInput {
            file_name: "a.pdf",
            mime_type: "application/pdf",
            content: b"%PDF",
        }
    }

    fn schema(document_type: &str, fields: &[&str]) -> FieldSchema {
        FieldSchema {
            document_type: document_type.to_string(),
            description: String::new(),
            fields: fields.iter().map(|f| FieldSpec::new(*f, "extract it")).collect(),
            version: 1,
        }
    }

    fn counting() -> Arc<CountingExtraction> {
        Arc::new(CountingExtraction {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_no_match_is_empty_object_without_call() {
        let fake = counting();
        let extractor = Extractor::new(fake.clone());

        let result = extractor.extract(&document(), &schema(NO_MATCH, &["a"])).unwrap();
        assert_eq!(result, Extraction::NoMatch);
        assert_eq!(result.to_json(), json!({}));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_prompts_is_warning_without_call() {
        let fake = counting();
        let extractor = Extractor::new(fake.clone());

        let result = extractor.extract(&document(), &schema("X", &[])).unwrap();
        assert_eq!(result.to_json(), json!({"warning": "NO_PROMPTS_CONFIGURED"}));
        assert!(!result.called_provider());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_configured_type_extracts_all_fields() {
        let fake = counting();
        let extractor = Extractor::new(fake.clone());

        let result = extractor
            .extract(&document(), &schema("PERMIT", &["permit_number", "address"]))
            .unwrap();
        let json = result.to_json();
        assert_eq!(json["permit_number"], json!("value of permit_number"));
        assert_eq!(json["address"], json!("value of address"));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }
}
