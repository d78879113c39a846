use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, info_span, warn};

use crate::ai::{CompletionCapability, DocumentInput, ExtractionCapability};
use crate::broadcast::job_progress::JobPhase;
use crate::db::record_repo::{self, NewRecord, Record, ValidationState};
use crate::db::Database;
use crate::registry::{self, FieldSchema};
use crate::sanitize;
use crate::stage::Stage;
use crate::worker::job::{Job, JobResult};

use super::classifier::Classifier;
use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::extractor::Extractor;
use super::progress::{ProgressEvent, ProgressReporter};
use super::validator::{Validation, Validator};

/// What one successful run wrote to the record store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedRecord {
    pub record_id: i64,
    pub file_name: String,
    pub document_type: String,
    pub schema_version: u32,
    pub extract_json: Value,
    pub validation_state: ValidationState,
    pub validation_json: Value,
}

/// Classify → extract → insert → validate → update, for one staged file.
///
/// Cheap to clone; every worker thread owns a copy.
#[derive(Clone)]
pub struct Pipeline {
    db: Database,
    stage: Stage,
    classifier: Classifier,
    extractor: Extractor,
    validator: Validator,
}

impl Pipeline {
    pub fn new(
        db: Database,
        stage: Stage,
        extraction: Arc<dyn ExtractionCapability>,
        completion: Arc<dyn CompletionCapability>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            db,
            stage,
            classifier: Classifier::new(Arc::clone(&extraction)),
            extractor: Extractor::new(extraction),
            validator: Validator::new(completion, config.validation_temperature),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Runs a queued job, folding any failure into the returned [`JobResult`].
    pub fn run(&self, job: Job, progress: &dyn ProgressReporter) -> JobResult {
        let mut ctx = PipelineContext::new(job);
        match self.execute(&mut ctx, progress) {
            Ok(processed) => JobResult::success(
                &ctx.job,
                processed.record_id,
                processed.document_type,
                processed.validation_state,
            ),
            Err(e) => {
                warn!("Processing {} failed: {}", ctx.job.file_name, e);
                JobResult::failure(&ctx.job, ctx.record_id, ctx.document_type, e.to_string())
            }
        }
    }

    /// Single-file entry point; failures propagate.
    pub fn process_file(
        &self,
        file_name: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessedRecord, PipelineError> {
        let mut ctx = PipelineContext::new(Job::new(file_name));
        self.execute(&mut ctx, progress)
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessedRecord, PipelineError> {
        let result = self.execute_steps(ctx, progress);
        match &result {
            Ok(processed) => progress.report(ProgressEvent::Completed {
                record_id: processed.record_id,
                document_type: processed.document_type.clone(),
            }),
            Err(e) => progress.report(ProgressEvent::Failed {
                error: e.to_string(),
            }),
        }
        result
    }

    fn execute_steps(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessedRecord, PipelineError> {
        let staged = self.stage.open(&ctx.job.file_name)?;
        let _pipeline_span = info_span!("pipeline",
            job_id = %ctx.job.id,
            file = %sanitize::redact_path(&staged.path),
        )
        .entered();

        let content = staged.read_bytes()?;
        let document = DocumentInput {
            file_name: &staged.file_name,
            mime_type: &staged.mime_type,
            content: &content,
        };

        // Step 1: Classify
        let document_type = {
            let _step = info_span!("classify").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Classifying,
                message: "Classifying document...".to_string(),
            });
            let vocabulary = registry::document_type_names(&self.db)?;
            self.classifier.classify(&document, &vocabulary)?
        };
        ctx.document_type = Some(document_type.clone());
        debug!("Classified as {}", document_type);

        // Step 2: Load the field schema once for both extractor and validator
        let schema = registry::load_field_schema(&self.db, &document_type)?;

        // Step 3: Extract
        let extraction = {
            let _step = info_span!("extract", fields = schema.fields.len()).entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Extracting,
                message: format!("Extracting {} field(s)...", schema.fields.len()),
            });
            self.extractor.extract(&document, &schema)?
        };
        let extract_json = extraction.to_json();

        // Step 4: Insert the record (validation pending)
        let record_id = {
            let _step = info_span!("store").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Storing,
                message: "Storing record...".to_string(),
            });
            let file_url = match self.stage.url_for(&staged.file_name) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("No URL for {}: {}", staged.file_name, e);
                    None
                }
            };
            record_repo::insert(
                &self.db,
                &NewRecord {
                    file_name: staged.file_name.clone(),
                    file_url,
                    document_type: document_type.clone(),
                    schema_version: schema.version,
                    extract_json: extract_json.clone(),
                },
            )?
        };
        ctx.record_id = Some(record_id);
        progress.report(ProgressEvent::RecordStored { record_id });

        // Step 5: Validate and attach the verdict to this row
        let validation = {
            let _step = info_span!("validate", record_id).entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Validating,
                message: "Validating extraction...".to_string(),
            });
            self.validate_and_store(record_id, &schema, &extract_json)?
        };

        info!(
            "Processed {} as {} (record {}, validation {})",
            staged.file_name,
            document_type,
            record_id,
            validation.state()
        );

        Ok(ProcessedRecord {
            record_id,
            file_name: staged.file_name,
            document_type,
            schema_version: schema.version,
            extract_json,
            validation_state: validation.state(),
            validation_json: validation.as_json().clone(),
        })
    }

    fn validate_and_store(
        &self,
        record_id: i64,
        schema: &FieldSchema,
        extract_json: &Value,
    ) -> Result<Validation, PipelineError> {
        match self.validator.validate(schema, extract_json) {
            Ok(validation) => {
                record_repo::set_validation(
                    &self.db,
                    record_id,
                    validation.state(),
                    Some(validation.as_json()),
                    None,
                )?;
                Ok(validation)
            }
            Err(e) => {
                let message = e.to_string();
                record_repo::set_validation(
                    &self.db,
                    record_id,
                    ValidationState::Failed,
                    None,
                    Some(&message),
                )?;
                Err(PipelineError::ValidationFailed {
                    record_id,
                    source: e,
                })
            }
        }
    }

    /// Re-runs validation for an existing record against its type's current schema.
    pub fn revalidate(&self, record: &Record) -> Result<Validation, PipelineError> {
        let _span = info_span!("revalidate", record_id = record.id).entered();
        let schema = registry::load_field_schema(&self.db, &record.document_type)?;
        if schema.version != record.schema_version {
            debug!(
                "Record {} was extracted with schema v{}, validating against v{}",
                record.id, record.schema_version, schema.version
            );
        }
        self.validate_and_store(record.id, &schema, &record.extract_json)
    }
}
