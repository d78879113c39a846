use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broadcast::job_progress::{JobPhase, JobProgressEvent, JobProgressTracker};

/// Events emitted by the pipeline while it processes one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase { phase: JobPhase, message: String },
    RecordStored { record_id: i64 },
    Completed { record_id: i64, document_type: String },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Reporter that drops every event.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events onto the job progress broadcast channel.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
}

impl BroadcastProgress {
    pub fn new(
        job_id: &str,
        file_name: &str,
        mime_type: Option<&str>,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            tracker: JobProgressTracker::new(job_id, file_name, mime_type, sender),
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => self.tracker.update_phase(phase, &message),
            ProgressEvent::RecordStored { record_id } => self.tracker.set_record_id(record_id),
            ProgressEvent::Completed {
                record_id,
                document_type,
            } => self.tracker.completed(record_id, &document_type),
            ProgressEvent::Failed { error } => self.tracker.failed(&error),
        }
    }
}
