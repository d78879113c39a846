pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod progress;
pub mod runner;
pub mod validator;

pub use classifier::Classifier;
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use extractor::{Extraction, Extractor};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{Pipeline, ProcessedRecord};
pub use validator::{Validation, Validator};
