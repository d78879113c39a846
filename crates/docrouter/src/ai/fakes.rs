//! Deterministic capability fakes for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use super::{AiError, CompletionCapability, CompletionRequest, DocumentInput, ExtractionCapability, FieldSpec};
use crate::pipeline::classifier::CLASSIFICATION_FIELD;

/// Classifies every file as `label`, fills each requested field with
/// `"<field> of <file>"` and answers validation with `verdict`.
pub(crate) struct ScriptedAi {
    label: Mutex<String>,
    verdict: Mutex<Result<Value, String>>,
    pub classify_calls: AtomicUsize,
    pub extract_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
}

impl ScriptedAi {
    pub fn new(label: &str) -> Self {
        Self {
            label: Mutex::new(label.to_string()),
            verdict: Mutex::new(Ok(json!({"valid": true, "notes": "all fields present"}))),
            classify_calls: AtomicUsize::new(0),
            extract_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_verdict(&self, verdict: Value) {
        *self.verdict.lock().unwrap() = Ok(verdict);
    }

    pub fn fail_completion(&self, message: &str) {
        *self.verdict.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.classify_calls.load(Ordering::SeqCst),
            self.extract_calls.load(Ordering::SeqCst),
            self.complete_calls.load(Ordering::SeqCst),
        )
    }
}

impl ExtractionCapability for ScriptedAi {
    fn extract(
        &self,
        document: &DocumentInput<'_>,
        fields: &[FieldSpec],
    ) -> Result<Map<String, Value>, AiError> {
        if fields.len() == 1 && fields[0].name == CLASSIFICATION_FIELD {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            let label = self.label.lock().unwrap().clone();
            let mut reply = Map::new();
            reply.insert(CLASSIFICATION_FIELD.to_string(), json!(label));
            return Ok(reply);
        }

        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        Ok(fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    json!(format!("{} of {}", f.name, document.file_name)),
                )
            })
            .collect())
    }
}

impl CompletionCapability for ScriptedAi {
    fn complete(&self, _request: &CompletionRequest) -> Result<Value, AiError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.verdict
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| AiError::Status {
                status: 500,
                body: message,
            })
    }
}
