pub mod ai;
pub mod app;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod review;
pub mod sanitize;
pub mod secrets;
pub mod stage;
pub mod worker;

pub use ai::{
    AiError, CompletionCapability, CompletionRequest, DocumentInput, ExtractionCapability,
    FieldSpec, HttpAiConfig, HttpAiProvider,
};
pub use app::{DocRouter, RevalidateReport, SetupReport, UploadReport};
pub use broadcast::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
pub use config::{load_config, Config};
pub use db::record_repo::{ApprovalFilter, Record, RecordFilter, ValidationState};
pub use db::Database;
pub use error::{ConfigError, DocrouterError, Result, StageError, WorkerError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, ProcessedRecord};
pub use registry::{FieldSchema, PromptInput, RegistryError, NO_MATCH};
pub use review::{FieldRow, RecordReview};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use stage::{FileKind, Stage, StageScanner};
pub use worker::{BatchReport, WorkerPool};
