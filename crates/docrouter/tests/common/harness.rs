//! Test harness for isolated test execution.
//!
//! Each `TestHarness` owns a temporary directory holding the stage and a
//! directory of "incoming" files to upload from, plus an in-memory database.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tempfile::TempDir;

use docrouter::db::record_repo::{self, Record, RecordFilter};
use docrouter::pipeline::PipelineConfig;
use docrouter::registry::{self, PromptInput};
use docrouter::{Database, DocRouter, Stage};

use super::fakes::KeywordAi;

pub struct TestHarness {
    temp_dir: TempDir,
    /// Where test files are written before upload.
    pub incoming_dir: PathBuf,
    pub ai: Arc<KeywordAi>,
    pub router: DocRouter,
}

impl TestHarness {
    /// A harness whose fake AI classifies files by keyword, e.g. `("permit", "PERMIT")`.
    pub fn new(keywords: &[(&str, &str)]) -> Self {
        Self::with_workers(keywords, 1)
    }

    pub fn with_workers(keywords: &[(&str, &str)], worker_count: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let incoming_dir = temp_dir.path().join("incoming");
        std::fs::create_dir_all(&incoming_dir).expect("Failed to create incoming dir");

        let stage = Stage::new(temp_dir.path().join("stage"), None).expect("Failed to build stage");
        let db = Database::open_in_memory().expect("Failed to open database");
        let ai = Arc::new(KeywordAi::new(keywords));
        let router = DocRouter::from_parts(
            db,
            stage,
            ai.clone(),
            ai.clone(),
            &PipelineConfig::default(),
            worker_count,
        );
        router.setup_with(&[]).expect("Failed to provision stage");

        Self {
            temp_dir,
            incoming_dir,
            ai,
            router,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db(&self) -> &Database {
        self.router.database()
    }

    /// Registers a document type and replaces its prompts with `fields` in order.
    pub fn register(&self, name: &str, description: &str, fields: &[(&str, &str)]) {
        registry::upsert_document_type(self.db(), name, description)
            .expect("Failed to register document type");
        let prompts: Vec<PromptInput> = fields
            .iter()
            .enumerate()
            .map(|(i, (field, prompt))| PromptInput::new(field, prompt, i as i64))
            .collect();
        registry::replace_field_prompts(self.db(), name, &prompts)
            .expect("Failed to store prompts");
    }

    /// Writes a file straight into the stage.
    pub fn stage_file(&self, file_name: &str, content: &[u8]) {
        self.router
            .stage()
            .put(file_name, content)
            .expect("Failed to stage file");
    }

    /// Backdates a staged file's modification time, which the stage feed
    /// treats as its arrival time.
    pub fn set_arrival(&self, file_name: &str, arrived_at: SystemTime) {
        let path = self.router.stage().directory().join(file_name);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .expect("Failed to open staged file")
            .set_modified(arrived_at)
            .expect("Failed to set modification time");
    }

    /// Writes a file outside the stage, ready for `upload_and_process`.
    pub fn write_incoming(&self, file_name: &str, content: &[u8]) -> PathBuf {
        let path = self.incoming_dir.join(file_name);
        std::fs::write(&path, content).expect("Failed to write incoming file");
        path
    }

    /// All records, newest first.
    pub fn records(&self) -> Vec<Record> {
        let filter = RecordFilter {
            limit: Some(1000),
            ..RecordFilter::default()
        };
        record_repo::query(self.db(), &filter)
            .expect("Failed to query records")
            .0
    }

    pub fn record(&self, id: i64) -> Record {
        record_repo::find_by_id(self.db(), id)
            .expect("Failed to load record")
            .expect("Record not found")
    }
}
