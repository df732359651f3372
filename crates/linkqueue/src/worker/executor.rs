//! Runs one admitted job to the end of its items.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::WorkerContext;
use crate::broadcast::JobEventKind;
use crate::config::ProcessingSettings;
use crate::error::WorkerError;
use crate::job::{Job, JobStatus};
use crate::pipeline::{ItemContext, ProcessedItem, RetryPolicy};

/// How a job run ended, from the worker's point of view.
#[derive(Debug, PartialEq)]
pub enum JobRun {
    /// Every item has a result; the job is now completed.
    Completed,
    /// The worker lost ownership (pause, cancel, shutdown) and stopped.
    Interrupted,
    /// The job failed with the given error.
    Failed(String),
}

/// What the item loop stopped on.
enum LoopEnd {
    Finished,
    Interrupted,
}

fn owned_by(job: &Job, worker_id: &str) -> bool {
    job.status == JobStatus::Processing && job.worker_id.as_deref() == Some(worker_id)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Processes the job's remaining items under the job's time limit, then
/// records the outcome if this worker still owns the job.
pub async fn run_job(
    ctx: &WorkerContext,
    job_id: &str,
    worker_id: &str,
    cancel: CancellationToken,
) -> JobRun {
    let span = info_span!("job", job_id = %job_id, worker_id = %worker_id);
    async move {
        let Some(job) = ctx.table.get(job_id) else {
            error!("Admitted job vanished before it started");
            return JobRun::Failed(WorkerError::JobLost(job_id.to_string()).to_string());
        };

        let config = ctx.config.get();
        let limit = config.timeout_for(job.kind);
        let retry = RetryPolicy::from_limits(&config.processing_limits);
        let settings = job.input.settings.clone();
        info!(
            items = job.progress.total,
            start_at = job.next_item_index(),
            "Job started"
        );

        let work = AssertUnwindSafe(process_items(
            ctx, job_id, worker_id, &settings, retry, &cancel,
        ))
        .catch_unwind();

        let failure = match tokio::time::timeout(limit, work).await {
            Ok(Ok(Ok(LoopEnd::Finished))) => return complete(ctx, job_id, worker_id),
            Ok(Ok(Ok(LoopEnd::Interrupted))) => {
                debug!("Job interrupted, leaving it to its new state");
                return JobRun::Interrupted;
            }
            Ok(Ok(Err(e))) => e,
            Ok(Err(payload)) => WorkerError::Panicked(panic_message(payload)),
            Err(_) => WorkerError::TimedOut(limit.as_secs()),
        };
        fail(ctx, job_id, worker_id, failure)
    }
    .instrument(span)
    .await
}

async fn process_items(
    ctx: &WorkerContext,
    job_id: &str,
    worker_id: &str,
    settings: &ProcessingSettings,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<LoopEnd, WorkerError> {
    let item_ctx = ItemContext {
        job_id,
        settings,
        retry,
        cancel,
    };

    loop {
        if cancel.is_cancelled() {
            return Ok(LoopEnd::Interrupted);
        }

        let next = ctx
            .table
            .update(job_id, |job| {
                if !owned_by(job, worker_id) {
                    return Err(LoopEnd::Interrupted);
                }
                let index = job.next_item_index();
                let Some(item) = job.input.items.get(index).cloned() else {
                    return Err(LoopEnd::Finished);
                };
                job.progress.current_item = Some(item.url.clone());
                Ok((index, item))
            })
            .ok_or_else(|| WorkerError::JobLost(job_id.to_string()))?;

        let (index, item) = match next {
            Ok(next) => next,
            Err(end) => return Ok(end),
        };

        let ProcessedItem { result, text_bytes } =
            ctx.processor.process(&item_ctx, index, &item).await;
        if cancel.is_cancelled() {
            debug!(index, "Dropping result of interrupted item");
            return Ok(LoopEnd::Interrupted);
        }

        let committed = ctx
            .update_persisted(job_id, |job| {
                if !owned_by(job, worker_id) || job.next_item_index() != index {
                    return None;
                }
                let usage = &mut job.resource_usage;
                usage.cpu_time_ms += result.timing.total_ms;
                usage.api_calls += u64::from(result.attempts.total());
                usage.memory_peak_bytes = usage.memory_peak_bytes.max(text_bytes);
                job.record_result(result, Utc::now());
                Some(job.clone())
            })
            .ok_or_else(|| WorkerError::JobLost(job_id.to_string()))?;

        let Some(job) = committed else {
            debug!(index, "Result discarded, job no longer owned");
            return Ok(LoopEnd::Interrupted);
        };

        ctx.events.emit(
            &job,
            JobEventKind::ItemProcessed,
            format!("Processed item {} of {}", index + 1, job.progress.total),
        );
    }
}

fn complete(ctx: &WorkerContext, job_id: &str, worker_id: &str) -> JobRun {
    let finished = ctx.update_persisted(job_id, |job| {
        if !owned_by(job, worker_id) {
            return None;
        }
        let now = Utc::now();
        job.close_out("not processed", now);
        job.finish(JobStatus::Completed, now);
        Some(job.clone())
    });

    match finished {
        Some(Some(job)) => {
            info!(
                processed = job.progress.processed,
                failed = job.progress.failed,
                "Job completed"
            );
            ctx.events
                .emit(&job, JobEventKind::Completed, "All items processed");
            JobRun::Completed
        }
        Some(None) => JobRun::Interrupted,
        None => JobRun::Failed(WorkerError::JobLost(job_id.to_string()).to_string()),
    }
}

fn fail(ctx: &WorkerContext, job_id: &str, worker_id: &str, error: WorkerError) -> JobRun {
    let message = error.to_string();
    warn!("Job failed: {}", message);

    let failed = ctx.update_persisted(job_id, |job| {
        if !owned_by(job, worker_id) {
            return None;
        }
        let now = Utc::now();
        job.last_error = Some(message.clone());
        job.close_out(&message, now);
        job.finish(JobStatus::Failed, now);
        Some(job.clone())
    });

    if let Some(Some(job)) = failed {
        ctx.events.emit(&job, JobEventKind::Failed, message.clone());
    }
    JobRun::Failed(message)
}
