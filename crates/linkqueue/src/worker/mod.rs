//! Bounded pool of job workers.

pub mod executor;
pub mod pool;

use std::sync::Arc;

use chrono::Utc;

use crate::broadcast::JobEventBroadcaster;
use crate::config::SharedConfig;
use crate::job::Job;
use crate::pipeline::ItemProcessor;
use crate::scheduler::Scheduler;
use crate::store::{JobRepository, JobTable};

pub use executor::{run_job, JobRun};
pub use pool::WorkerPool;

/// State shared between the queue facade and its workers.
pub struct WorkerContext {
    pub table: Arc<JobTable>,
    pub config: SharedConfig,
    pub scheduler: Arc<Scheduler>,
    pub processor: Arc<ItemProcessor>,
    pub events: JobEventBroadcaster,
    pub repository: Arc<dyn JobRepository>,
}

impl WorkerContext {
    /// Writes one job through to the repository. Failures are logged; the
    /// job table stays authoritative.
    ///
    /// Call with the job's lock held so writes for one job reach the
    /// repository in the order their updates were made.
    pub fn persist(&self, job: &Job) {
        if let Err(e) = self.repository.upsert_job(job) {
            tracing::error!(job_id = %job.id, "Failed to persist job: {}", e);
        }
    }

    /// Runs `f` with the job locked. When it returns `Some`, the job is
    /// written through before the lock is released.
    pub fn update_persisted<T>(
        &self,
        job_id: &str,
        f: impl FnOnce(&mut Job) -> Option<T>,
    ) -> Option<Option<T>> {
        self.table.update(job_id, |job| {
            let out = f(job)?;
            self.persist(job);
            Some(out)
        })
    }

    /// Recomputes pending positions and estimates.
    pub fn reschedule(&self) {
        self.scheduler
            .apply(&self.table, &self.config.get(), Utc::now());
    }
}
