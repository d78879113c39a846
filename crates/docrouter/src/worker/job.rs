use serde::Serialize;

use crate::db::record_repo::ValidationState;
use crate::db::stage_repo::StageEntry;

/// One staged file queued for the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub file_name: String,
    /// Change-feed sequence number when the job came from a batch scan.
    pub feed_seq: Option<i64>,
    /// MIME type guessed from the file name.
    pub mime_type: Option<String>,
}

impl Job {
    fn new_internal(file_name: &str, feed_seq: Option<i64>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            feed_seq,
            mime_type: mime_guess::from_path(file_name).first().map(|m| m.to_string()),
        }
    }

    pub fn new(file_name: &str) -> Self {
        Self::new_internal(file_name, None)
    }

    pub fn from_feed(entry: &StageEntry) -> Self {
        Self::new_internal(&entry.file_name, Some(entry.seq))
    }
}

/// Outcome of a single pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_id: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_seq: Option<i64>,
    pub success: bool,
    /// Present whenever the record row was inserted, even if validation later failed.
    pub record_id: Option<i64>,
    pub document_type: Option<String>,
    pub validation_state: Option<ValidationState>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(
        job: &Job,
        record_id: i64,
        document_type: String,
        validation_state: ValidationState,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            file_name: job.file_name.clone(),
            feed_seq: job.feed_seq,
            success: true,
            record_id: Some(record_id),
            document_type: Some(document_type),
            validation_state: Some(validation_state),
            error: None,
        }
    }

    pub fn failure(
        job: &Job,
        record_id: Option<i64>,
        document_type: Option<String>,
        error: String,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            file_name: job.file_name.clone(),
            feed_seq: job.feed_seq,
            success: false,
            validation_state: record_id.map(|_| ValidationState::Failed),
            record_id,
            document_type,
            error: Some(error),
        }
    }
}
