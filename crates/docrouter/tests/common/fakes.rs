//! Scripted document-AI capabilities.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use docrouter::ai::{
    AiError, CompletionCapability, CompletionRequest, DocumentInput, ExtractionCapability,
    FieldSpec,
};
use docrouter::pipeline::classifier::CLASSIFICATION_FIELD;

/// Snapshot of how often each capability was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AiCalls {
    pub classify: usize,
    pub extract: usize,
    pub complete: usize,
}

/// Classifies a file by the first keyword found in its name, fills every
/// requested field with `"<field> of <file>"` and answers validation with a
/// fixed verdict.
pub struct KeywordAi {
    keywords: Vec<(String, String)>,
    fallback_label: String,
    verdict: Mutex<Result<Value, String>>,
    failing_files: Mutex<Vec<String>>,
    classify_calls: AtomicUsize,
    extract_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    last_prompt: Mutex<Option<CompletionRequest>>,
}

impl KeywordAi {
    pub fn new(keywords: &[(&str, &str)]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|(k, l)| (k.to_lowercase(), l.to_string()))
                .collect(),
            fallback_label: "UNKNOWN".to_string(),
            verdict: Mutex::new(Ok(json!({"valid": true, "notes": "All fields look plausible"}))),
            failing_files: Mutex::new(Vec::new()),
            classify_calls: AtomicUsize::new(0),
            extract_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn set_verdict(&self, verdict: Value) {
        *self.verdict.lock().unwrap() = Ok(verdict);
    }

    pub fn fail_validation(&self, message: &str) {
        *self.verdict.lock().unwrap() = Err(message.to_string());
    }

    /// Makes field extraction fail for one file name.
    pub fn fail_extraction_for(&self, file_name: &str) {
        self.failing_files.lock().unwrap().push(file_name.to_string());
    }

    pub fn calls(&self) -> AiCalls {
        AiCalls {
            classify: self.classify_calls.load(Ordering::SeqCst),
            extract: self.extract_calls.load(Ordering::SeqCst),
            complete: self.complete_calls.load(Ordering::SeqCst),
        }
    }

    pub fn last_completion(&self) -> Option<CompletionRequest> {
        self.last_prompt.lock().unwrap().clone()
    }

    fn label_for(&self, file_name: &str) -> String {
        let lowered = file_name.to_lowercase();
        self.keywords
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword.as_str()))
            .map(|(_, label)| label.clone())
            .unwrap_or_else(|| self.fallback_label.clone())
    }
}

impl ExtractionCapability for KeywordAi {
    fn extract(
        &self,
        document: &DocumentInput<'_>,
        fields: &[FieldSpec],
    ) -> Result<Map<String, Value>, AiError> {
        if fields.len() == 1 && fields[0].name == CLASSIFICATION_FIELD {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            let mut reply = Map::new();
            // Lowercase on purpose: the classifier normalizes case.
            reply.insert(
                CLASSIFICATION_FIELD.to_string(),
                json!(self.label_for(document.file_name).to_lowercase()),
            );
            return Ok(reply);
        }

        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_files
            .lock()
            .unwrap()
            .iter()
            .any(|f| f == document.file_name)
        {
            return Err(AiError::Timeout(120));
        }
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

impl CompletionCapability for KeywordAi {
    fn complete(&self, request: &CompletionRequest) -> Result<Value, AiError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(request.clone());
        self.verdict
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| AiError::Status {
                status: 503,
                body: message,
            })
    }
}
