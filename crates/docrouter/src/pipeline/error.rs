use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage access failed: {0}")]
    Stage(#[from] crate::error::StageError),

    #[error("Registry lookup failed: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("AI call failed: {0}")]
    Ai(#[from] crate::ai::AiError),

    #[error("Record store failed: {0}")]
    Database(#[from] crate::db::DatabaseError),

    /// The record was stored but its validation call failed.
    #[error("Validation of record {record_id} failed: {source}")]
    ValidationFailed {
        record_id: i64,
        #[source]
        source: crate::ai::AiError,
    },
}

impl PipelineError {
    /// Id of the record left behind by a failure after the insert phase.
    pub fn record_id(&self) -> Option<i64> {
        match self {
            PipelineError::ValidationFailed { record_id, .. } => Some(*record_id),
            _ => None,
        }
    }
}
