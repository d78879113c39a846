use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, info_span, warn};

use crate::broadcast::job_progress::JobProgressEvent;
use crate::error::StageError;
use crate::pipeline::progress::{BroadcastProgress, NoopProgress};
use crate::pipeline::Pipeline;
use crate::stage::{self, StageScanner};
use crate::worker::job::{Job, JobResult};
use crate::worker::pool::WorkerPool;

/// Summary of one pass over the change feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Files the pipeline ran for, successful or not.
    pub processed: usize,
    pub failed: usize,
    /// Per-file outcomes in feed order.
    pub results: Vec<JobResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.processed - self.failed
    }
}

/// Refreshes the change feed from the stage directory, then runs the pipeline
/// once per pending entry.
///
/// Entries are consumed whatever the outcome. With `worker_count` above 1 files
/// are spread over a [`WorkerPool`]; each file still inserts before it validates.
pub fn run_batch(
    pipeline: &Pipeline,
    scanner: &StageScanner,
    worker_count: usize,
    progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
) -> Result<BatchReport, StageError> {
    let _span = info_span!("batch", workers = worker_count).entered();

    let registered = stage::refresh(scanner, pipeline.database())?;
    let entries = stage::pending_feed(pipeline.database())?;
    info!(
        "Batch: {} new feed entries, {} pending",
        registered,
        entries.len()
    );

    if entries.is_empty() {
        return Ok(BatchReport::default());
    }

    let jobs: Vec<Job> = entries.iter().map(Job::from_feed).collect();

    let mut results = if worker_count <= 1 {
        run_sequential(pipeline, jobs, progress_sender.as_ref())
    } else {
        run_pooled(pipeline, jobs, worker_count, progress_sender)
    };
    results.sort_by_key(|r| r.feed_seq);

    let mut report = BatchReport::default();
    for result in results {
        if let Some(seq) = result.feed_seq {
            stage::mark_consumed(pipeline.database(), seq)?;
        }
        report.processed += 1;
        if !result.success {
            report.failed += 1;
            warn!(
                "Batch: {} failed: {}",
                result.file_name,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        report.results.push(result);
    }

    info!(
        "Batch finished: {} processed, {} failed",
        report.processed, report.failed
    );
    Ok(report)
}

fn run_sequential(
    pipeline: &Pipeline,
    jobs: Vec<Job>,
    progress_sender: Option<&Arc<broadcast::Sender<JobProgressEvent>>>,
) -> Vec<JobResult> {
    jobs.into_iter()
        .map(|job| match progress_sender {
            Some(sender) => {
                let progress = BroadcastProgress::new(
                    &job.id,
                    &job.file_name,
                    job.mime_type.as_deref(),
                    Arc::clone(sender),
                );
                pipeline.run(job, &progress)
            }
            None => pipeline.run(job, &NoopProgress),
        })
        .collect()
}

fn run_pooled(
    pipeline: &Pipeline,
    jobs: Vec<Job>,
    worker_count: usize,
    progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
) -> Vec<JobResult> {
    let pool = WorkerPool::with_progress_sender(pipeline.clone(), worker_count, progress_sender);

    let mut submitted = 0;
    let mut results = Vec::with_capacity(jobs.len());
    for job in jobs {
        let fallback = job.clone();
        match pool.submit(job) {
            Ok(()) => submitted += 1,
            Err(e) => results.push(JobResult::failure(&fallback, None, None, e.to_string())),
        }
    }

    for _ in 0..submitted {
        match pool.recv_result() {
            Some(result) => results.push(result),
            None => break,
        }
    }

    pool.shutdown();
    pool.wait();
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::fakes::ScriptedAi;
    use crate::db::record_repo::{self, RecordFilter};
    use crate::db::Database;
    use crate::pipeline::PipelineConfig;
    use crate::registry::{self, PromptInput};
    use crate::stage::Stage;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Pipeline, StageScanner, Arc<ScriptedAi>) {
        let stage_dir = dir.path().join("stage");
        let stage = Stage::new(&stage_dir, None).unwrap();
        stage.ensure_exists().unwrap();
        let db = Database::open_in_memory().unwrap();
        registry::upsert_document_type(&db, "INVOICE", "Supplier invoices").unwrap();
        registry::replace_field_prompts(&db, "INVOICE", &[PromptInput::new("total", "Total", 0)])
            .unwrap();
        let ai = Arc::new(ScriptedAi::new("INVOICE"));
        let pipeline = Pipeline::new(db, stage, ai.clone(), ai.clone(), &PipelineConfig::default());
        (pipeline, StageScanner::new(&stage_dir), ai)
    }

    #[test]
    fn test_batch_processes_feed_and_consumes_it() {
        let dir = TempDir::new().unwrap();
        let (pipeline, scanner, _ai) = setup(&dir);
        pipeline.stage().put("a.pdf", b"%PDF").unwrap();
        pipeline.stage().put("b.png", b"PNG").unwrap();
        pipeline.stage().put("notes.txt", b"ignored").unwrap();

        let report = run_batch(&pipeline, &scanner, 1, None).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 0);
        let names: Vec<&str> = report.results.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.png"]);

        let again = run_batch(&pipeline, &scanner, 1, None).unwrap();
        assert_eq!(again.processed, 0);
    }

    #[test]
    fn test_batch_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let (pipeline, scanner, ai) = setup(&dir);
        pipeline.stage().put("a.pdf", b"%PDF").unwrap();
        pipeline.stage().put("b.pdf", b"%PDF").unwrap();
        ai.fail_completion("provider down");

        let report = run_batch(&pipeline, &scanner, 1, None).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.succeeded(), 0);

        // Partial records stay behind and the feed is drained.
        let (records, total) =
            record_repo::query(pipeline.database(), &RecordFilter::default()).unwrap();
        assert_eq!(total, 2);
        assert!(records.iter().all(|r| r.validation_json.is_none()));
        assert!(stage::pending_feed(pipeline.database()).unwrap().is_empty());
    }

    #[test]
    fn test_pooled_batch_keeps_feed_order() {
        let dir = TempDir::new().unwrap();
        let (pipeline, scanner, ai) = setup(&dir);
        for i in 0..5 {
            pipeline.stage().put(&format!("inv-{i}.pdf"), b"%PDF").unwrap();
        }

        let report = run_batch(&pipeline, &scanner, 3, None).unwrap();
        assert_eq!(report.processed, 5);
        assert_eq!(report.failed, 0);
        let seqs: Vec<i64> = report.results.iter().filter_map(|r| r.feed_seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort();
        assert_eq!(seqs, sorted);
        assert_eq!(ai.calls(), (5, 5, 5));
    }

    #[test]
    fn test_reprocessing_modified_file_appends_record() {
        let dir = TempDir::new().unwrap();
        let (pipeline, scanner, _ai) = setup(&dir);
        pipeline.stage().put("a.pdf", b"%PDF").unwrap();
        run_batch(&pipeline, &scanner, 1, None).unwrap();

        pipeline.stage().put("a.pdf", b"%PDF-1.7 revised").unwrap();
        let report = run_batch(&pipeline, &scanner, 1, None).unwrap();
        assert_eq!(report.processed, 1);

        let filter = RecordFilter {
            file_name: Some("a.pdf".to_string()),
            ..RecordFilter::default()
        };
        let (_, total) = record_repo::query(pipeline.database(), &filter).unwrap();
        assert_eq!(total, 2);
    }
}
