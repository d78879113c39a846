use crate::worker::job::Job;

/// Per-file state accumulated as the pipeline steps run.
///
/// Kept outside the step return values so a failure can still report how far
/// the file got.
pub struct PipelineContext {
    pub job: Job,

    // Set after classification.
    pub document_type: Option<String>,

    // Set after the record insert.
    pub record_id: Option<i64>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            document_type: None,
            record_id: None,
        }
    }
}
