//! The application facade: one handle over the database, stage, AI provider
//! and pipeline, used by the CLI and by embedding applications.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::ai::{CompletionCapability, ExtractionCapability, HttpAiConfig, HttpAiProvider};
use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::config::{Config, DocumentTypeSeed};
use crate::db::record_repo::{self, Record, RecordFilter};
use crate::db::Database;
use crate::error::{ConfigError, DocrouterError, Result};
use crate::pipeline::{BroadcastProgress, Pipeline, PipelineConfig, ProcessedRecord};
use crate::registry;
use crate::review::RecordReview;
use crate::sanitize;
use crate::secrets;
use crate::stage::{Stage, StageScanner};
use crate::worker::batch::{run_batch, BatchReport};
use crate::worker::job::Job;

/// What `setup` changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupReport {
    pub types_created: usize,
    pub prompt_sets_replaced: usize,
}

/// Outcome of an upload, possibly followed by processing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    pub processed: Vec<ProcessedRecord>,
    /// One message per file that failed to upload or process.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RevalidateReport {
    pub revalidated: usize,
    pub failed: usize,
}

pub struct DocRouter {
    pipeline: Pipeline,
    scanner: StageScanner,
    worker_count: usize,
    progress: Arc<JobProgressBroadcaster>,
    seeds: Vec<DocumentTypeSeed>,
}

impl DocRouter {
    /// Opens the database and connects the HTTP AI provider described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let db_path = config.database_path().ok_or_else(|| ConfigError::Validation {
            message: "No database_path configured and no home directory found".to_string(),
        })?;
        let db = Database::open(&db_path)?;

        let stage = Stage::new(config.stage.directory_path(), config.stage.url_base.as_deref())?;

        let ai = &config.ai;
        let api_key = secrets::resolve_secret_optional(
            ai.api_key.as_deref(),
            ai.api_key_file.as_deref(),
            ai.api_key_env_var.as_deref(),
        )?;
        if api_key.is_none() {
            debug!("No AI API key configured; calling the service unauthenticated");
        }
        let provider = Arc::new(HttpAiProvider::new(HttpAiConfig {
            endpoint: ai.endpoint.clone(),
            api_key,
            timeout_secs: ai.timeout_secs,
            validation_model: ai.validation_model.clone().unwrap_or_else(|| "default".to_string()),
        })?);
        info!(
            "Using document-AI service at {}",
            sanitize::redact_url(provider.endpoint())
        );

        let mut router = Self::from_parts(
            db,
            stage,
            provider.clone(),
            provider,
            &PipelineConfig::from_config(config),
            config.effective_worker_count(),
        );
        router.seeds = config.document_types.clone();
        Ok(router)
    }

    /// Assembles a router from already-built parts, e.g. in-memory storage and fake capabilities.
    pub fn from_parts(
        db: Database,
        stage: Stage,
        extraction: Arc<dyn ExtractionCapability>,
        completion: Arc<dyn CompletionCapability>,
        pipeline_config: &PipelineConfig,
        worker_count: usize,
    ) -> Self {
        let scanner = StageScanner::new(stage.directory());
        Self {
            pipeline: Pipeline::new(db, stage, extraction, completion, pipeline_config),
            scanner,
            worker_count: worker_count.max(1),
            progress: Arc::new(JobProgressBroadcaster::default()),
            seeds: Vec::new(),
        }
    }

    pub fn database(&self) -> &Database {
        self.pipeline.database()
    }

    pub fn stage(&self) -> &Stage {
        self.pipeline.stage()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.progress.subscribe()
    }

    /// Provisions the stage directory and seeds the registry from the config.
    pub fn setup(&self) -> Result<SetupReport> {
        self.setup_with(&self.seeds)
    }

    /// Seeds are insert-if-absent for types; a seed with `fields` replaces that type's prompts.
    pub fn setup_with(&self, seeds: &[DocumentTypeSeed]) -> Result<SetupReport> {
        self.stage().ensure_exists()?;

        let mut report = SetupReport::default();
        for seed in seeds {
            if registry::upsert_document_type(self.database(), &seed.name, &seed.description)? {
                report.types_created += 1;
            }
            if let Some(fields) = &seed.fields {
                let stored = registry::replace_field_prompts(self.database(), &seed.name, fields)?;
                debug!("Seeded {} prompt(s) for {}", stored, seed.name);
                report.prompt_sets_replaced += 1;
            }
        }

        info!(
            "Setup complete: {} new document type(s), {} prompt set(s) replaced",
            report.types_created, report.prompt_sets_replaced
        );
        Ok(report)
    }

    /// Copies each file into the stage, then (when `process` is set) runs the
    /// pipeline on it. Per-file failures are collected rather than aborting.
    pub fn upload_and_process(&self, files: &[PathBuf], process: bool) -> UploadReport {
        let mut report = UploadReport::default();

        for path in files {
            let file_name = match upload_name(path) {
                Some(name) => name,
                None => {
                    report
                        .errors
                        .push(format!("{}: not a file name", path.display()));
                    continue;
                }
            };

            let staged = std::fs::read(path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    self.stage()
                        .put(&file_name, &bytes)
                        .map_err(|e| e.to_string())
                });
            if let Err(e) = staged {
                warn!("Upload of {} failed: {}", file_name, e);
                report.errors.push(format!("{}: {}", file_name, e));
                continue;
            }
            report.uploaded.push(file_name.clone());

            if process {
                match self.process_one_file(&file_name) {
                    Ok(processed) => report.processed.push(processed),
                    Err(e) => report.errors.push(format!("{}: {}", file_name, e)),
                }
            }
        }

        info!(
            "Uploaded {} file(s), processed {}, {} error(s)",
            report.uploaded.len(),
            report.processed.len(),
            report.errors.len()
        );
        report
    }

    /// Runs the single-file pipeline for a staged file.
    pub fn process_one_file(&self, file_name: &str) -> Result<ProcessedRecord> {
        let job = Job::new(file_name);
        let progress = BroadcastProgress::new(
            &job.id,
            &job.file_name,
            job.mime_type.as_deref(),
            self.progress.sender(),
        );
        Ok(self.pipeline.process_file(file_name, &progress)?)
    }

    /// Refreshes the change feed and processes everything pending.
    pub fn process_new_files(&self) -> Result<BatchReport> {
        Ok(run_batch(
            &self.pipeline,
            &self.scanner,
            self.worker_count,
            Some(self.progress.sender()),
        )?)
    }

    /// Processes the backlog, then runs a batch whenever a staged file
    /// appears or changes, until `shutdown` is set.
    pub fn watch(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        self.stage().ensure_exists()?;
        self.process_new_files()?;

        let pipeline = self.pipeline.clone();
        let scanner = self.scanner.clone();
        let worker_count = self.worker_count;
        let sender = self.progress.sender();

        self.scanner.watch(
            move |file_name| {
                debug!("Change in stage: {}", file_name);
                match run_batch(&pipeline, &scanner, worker_count, Some(Arc::clone(&sender))) {
                    Ok(report) if report.processed > 0 => info!(
                        "Processed {} file(s), {} failed",
                        report.processed, report.failed
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("Batch after stage change failed: {}", e),
                }
            },
            shutdown,
        )?;
        Ok(())
    }

    /// Approves the newest record for `file_name` with the reviewer's edited fields.
    pub fn approve_latest(&self, file_name: &str, edited: &Value) -> Result<Record> {
        let record = record_repo::find_latest_by_file_name(self.database(), file_name)?
            .ok_or_else(|| DocrouterError::RecordNotFound(file_name.to_string()))?;
        self.approve_by_id(record.id, edited)
    }

    pub fn approve_by_id(&self, record_id: i64, edited: &Value) -> Result<Record> {
        if !record_repo::approve(self.database(), record_id, edited, Utc::now())? {
            return Err(DocrouterError::RecordNotFound(format!("id {}", record_id)));
        }
        info!("Approved record {}", record_id);
        record_repo::find_by_id(self.database(), record_id)?
            .ok_or_else(|| DocrouterError::RecordNotFound(format!("id {}", record_id)))
    }

    pub fn list_records(&self, filter: &RecordFilter) -> Result<(Vec<Record>, u64)> {
        Ok(record_repo::query(self.database(), filter)?)
    }

    /// Review projection of the newest record for `file_name`.
    pub fn review(&self, file_name: &str) -> Result<RecordReview> {
        let record = record_repo::find_latest_by_file_name(self.database(), file_name)?
            .ok_or_else(|| DocrouterError::RecordNotFound(file_name.to_string()))?;
        Ok(RecordReview::from_record(&record))
    }

    /// Re-runs validation for every record still `pending` or `failed`.
    pub fn revalidate_pending(&self) -> Result<RevalidateReport> {
        let mut report = RevalidateReport::default();
        for record in record_repo::list_needing_validation(self.database())? {
            match self.pipeline.revalidate(&record) {
                Ok(_) => report.revalidated += 1,
                Err(e) => {
                    warn!("Revalidation of record {} failed: {}", record.id, e);
                    report.failed += 1;
                }
            }
        }
        info!(
            "Revalidated {} record(s), {} failed",
            report.revalidated, report.failed
        );
        Ok(report)
    }
}

fn upload_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
}
