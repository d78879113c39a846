//! Job progress broadcaster for real-time pipeline status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase of a file's trip through the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Classifying,
    Extracting,
    Storing,
    Validating,
    Completed,
    Failed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Classifying => write!(f, "Classifying"),
            JobPhase::Extracting => write!(f, "Extracting fields"),
            JobPhase::Storing => write!(f, "Storing record"),
            JobPhase::Validating => write!(f, "Validating"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

/// Progress event for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub file_name: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Set once the record row exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
    /// Classification result (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, file_name: &str, phase: JobPhase, message: &str) -> Self {
        let status = match phase {
            JobPhase::Completed => JobStatus::Completed,
            JobPhase::Failed => JobStatus::Failed,
            _ => JobStatus::Processing,
        };

        Self {
            job_id: job_id.to_string(),
            file_name: file_name.to_string(),
            phase,
            status,
            message: message.to_string(),
            timestamp: Utc::now(),
            record_id: None,
            document_type: None,
            error: None,
            mime_type: None,
        }
    }

    pub fn completed(job_id: &str, file_name: &str, record_id: i64, document_type: &str) -> Self {
        let mut event = Self::new(
            job_id,
            file_name,
            JobPhase::Completed,
            "Processing completed successfully",
        );
        event.record_id = Some(record_id);
        event.document_type = Some(document_type.to_string());
        event
    }

    pub fn failed(job_id: &str, file_name: &str, error: &str) -> Self {
        let mut event = Self::new(job_id, file_name, JobPhase::Failed, "Processing failed");
        event.error = Some(error.to_string());
        event
    }
}

/// Fans job progress events out to any number of subscribers.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn sender(&self) -> Arc<broadcast::Sender<JobProgressEvent>> {
        Arc::clone(&self.sender)
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Emits events for a single job.
pub struct JobProgressTracker {
    job_id: String,
    file_name: String,
    mime_type: Option<String>,
    record_id: std::sync::Mutex<Option<i64>>,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(
        job_id: &str,
        file_name: &str,
        mime_type: Option<&str>,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            file_name: file_name.to_string(),
            mime_type: mime_type.map(|m| m.to_string()),
            record_id: std::sync::Mutex::new(None),
            sender,
        }
    }

    /// Remembers the record id so later events carry it.
    pub fn set_record_id(&self, record_id: i64) {
        if let Ok(mut guard) = self.record_id.lock() {
            *guard = Some(record_id);
        }
    }

    fn emit(&self, mut event: JobProgressEvent) {
        event.mime_type = self.mime_type.clone();
        if event.record_id.is_none() {
            event.record_id = self.record_id.lock().ok().and_then(|g| *g);
        }
        let _ = self.sender.send(event);
    }

    pub fn update_phase(&self, phase: JobPhase, message: &str) {
        self.emit(JobProgressEvent::new(
            &self.job_id,
            &self.file_name,
            phase,
            message,
        ));
    }

    pub fn completed(&self, record_id: i64, document_type: &str) {
        self.emit(JobProgressEvent::completed(
            &self.job_id,
            &self.file_name,
            record_id,
            document_type,
        ));
    }

    pub fn failed(&self, error: &str) {
        self.emit(JobProgressEvent::failed(&self.job_id, &self.file_name, error));
    }
}
