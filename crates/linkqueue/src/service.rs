//! The queue facade: submission, lifecycle control, status, metrics and
//! maintenance over one shared job table.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
use crate::config::schema::check_range;
use crate::config::{
    ProcessingSettings, QueueConfig, QueueConfigPatch, SharedConfig, MAX_RETENTION_DAYS,
};
use crate::enrich::{
    ContentAnalyzer, ContentExtractor, HttpExtractor, KeywordAnalyzer, KnownLink, LinkIndex,
    SimilarityFinder,
};
use crate::error::{LifecycleError, LinkQueueError, Result, ResultsError, SubmitError};
use crate::job::lifecycle;
use crate::job::{
    Applied, Command, Item, Job, JobOutput, JobPriority, JobStatus, JobStatusView,
    ManageOutcome, ManageRequest,
};
use crate::maintenance::{CleanupReport, CleanupType, Sweeper};
use crate::metrics::{
    MetricsAggregator, PriorityDistribution, QueueMetrics, ResourceProbe, RECENT_SNAPSHOTS,
};
use crate::pipeline::{parse_item_url, ItemProcessor, ItemStatus};
use crate::sanitize;
use crate::scheduler::{Scheduler, StartTimeEstimator, WaitEstimate};
use crate::store::{JobPage, JobQuery, JobRepository, JobTable, MemoryRepository};
use crate::worker::{WorkerContext, WorkerPool};

/// Capacity and backlog as returned by `get_queue_status`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub capacity: usize,
    pub occupancy: usize,
    pub available_slots: usize,
    pub queue_length: usize,
    pub max_queue_size: usize,
    pub pending_by_priority: PriorityDistribution,
    pub wait_estimates: Vec<WaitEstimate>,
}

/// Current metrics plus recent history, oldest first.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub current: QueueMetrics,
    pub history: Vec<QueueMetrics>,
}

/// Wires the queue together. Every collaborator has a default.
pub struct LinkQueueBuilder {
    config: QueueConfig,
    repository: Option<Arc<dyn JobRepository>>,
    extractor: Option<Arc<dyn ContentExtractor>>,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    similarity: Option<Arc<dyn SimilarityFinder>>,
    estimator: Option<Arc<dyn StartTimeEstimator>>,
    probe: Option<Arc<dyn ResourceProbe>>,
    event_capacity: usize,
}

impl Default for LinkQueueBuilder {
    fn default() -> Self {
        Self {
            config: QueueConfig::default(),
            repository: None,
            extractor: None,
            analyzer: None,
            similarity: None,
            estimator: None,
            probe: None,
            event_capacity: 256,
        }
    }
}

impl LinkQueueBuilder {
    /// Config used unless the repository holds a persisted one.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn similarity(mut self, similarity: Arc<dyn SimilarityFinder>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn estimator(mut self, estimator: Arc<dyn StartTimeEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn resource_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Loads persisted state and recovers jobs interrupted by a previous
    /// process. The dispatcher does not run until [`LinkQueue::start`].
    pub async fn open(self) -> Result<LinkQueue> {
        self.config.validate()?;
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(MemoryRepository::new()));

        let config = match repository.load_config()? {
            Some(stored) => match stored.validate() {
                Ok(()) => {
                    log::info!("Using persisted queue config");
                    stored
                }
                Err(e) => {
                    log::warn!("Ignoring invalid persisted config: {}", e);
                    self.config
                }
            },
            None => self.config,
        };

        let mut jobs = repository.load_jobs()?;
        let mut recovered = 0;
        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Processing) {
            job.status = JobStatus::Pending;
            job.worker_id = None;
            job.progress.current_item = None;
            job.retry_count += 1;
            job.updated_at = Utc::now();
            recovered += 1;
        }
        if recovered > 0 {
            log::warn!("Returned {} interrupted jobs to the queue", recovered);
            repository.save_jobs(&jobs)?;
        }

        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(HttpExtractor::new(
                config.processing_limits.stage_timeout(),
            )?),
        };
        let analyzer = self
            .analyzer
            .unwrap_or_else(|| Arc::new(KeywordAnalyzer::new()));
        let similarity = self
            .similarity
            .unwrap_or_else(|| Arc::new(LinkIndex::new()));
        seed_links(similarity.as_ref(), &jobs).await;

        let scheduler = match self.estimator {
            Some(estimator) => Scheduler::new(estimator),
            None => Scheduler::default(),
        };
        let metrics = match self.probe {
            Some(probe) => MetricsAggregator::new(probe),
            None => MetricsAggregator::default(),
        };
        let mut history = repository.load_metrics_history()?;
        let keep = config.maintenance.max_metrics_history;
        if history.len() > keep {
            history.drain(..history.len() - keep);
        }

        let capacity = config.max_concurrent_jobs;
        let ctx = Arc::new(WorkerContext {
            table: Arc::new(JobTable::from_jobs(jobs)),
            config: SharedConfig::new(config),
            scheduler: Arc::new(scheduler),
            processor: Arc::new(ItemProcessor::new(extractor, analyzer, similarity)),
            events: JobEventBroadcaster::new(self.event_capacity),
            repository,
        });
        ctx.reschedule();
        log::info!("Opened link queue with {} jobs", ctx.table.len());

        Ok(LinkQueue {
            pool: Arc::new(WorkerPool::new(Arc::clone(&ctx), capacity)),
            ctx,
            metrics: metrics.with_history(history),
            sweeper: Sweeper,
        })
    }
}

/// Registers every successfully processed link with the similarity index.
async fn seed_links(similarity: &dyn SimilarityFinder, jobs: &[Job]) {
    for job in jobs {
        let Some(output) = &job.output else { continue };
        for result in output.results.iter().filter(|r| r.status == ItemStatus::Success) {
            let link = KnownLink {
                id: format!("{}:{}", job.id, result.index),
                url: result.url.clone(),
                title: result.content.as_ref().and_then(|c| c.title.clone()),
            };
            if let Err(e) = similarity.register(link).await {
                log::warn!("Failed to seed link index: {}", e);
                return;
            }
        }
    }
}

/// Link enrichment queue.
pub struct LinkQueue {
    ctx: Arc<WorkerContext>,
    pool: Arc<WorkerPool>,
    metrics: MetricsAggregator,
    sweeper: Sweeper,
}

impl LinkQueue {
    pub fn builder() -> LinkQueueBuilder {
        LinkQueueBuilder::default()
    }

    /// Starts admitting pending jobs.
    pub fn start(&self) -> Result<()> {
        self.pool.start()?;
        Ok(())
    }

    /// Stops admission, interrupts running jobs and waits for their workers.
    /// Interrupted jobs go back to `pending` with their partial results.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;

        let mut requeued = 0;
        self.ctx.table.for_each_mut(|job| {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.progress.current_item = None;
                job.updated_at = Utc::now();
                self.ctx.persist(job);
                requeued += 1;
            }
        });
        if requeued > 0 {
            log::info!("Requeued {} interrupted jobs", requeued);
            self.ctx.reschedule();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.events.subscribe()
    }

    pub fn config(&self) -> QueueConfig {
        self.ctx.config.get()
    }

    /// Validates and enqueues a job. Returns the new job id.
    pub fn submit(
        &self,
        owner_id: &str,
        items: Vec<Item>,
        settings: Option<ProcessingSettings>,
        priority: Option<JobPriority>,
    ) -> Result<String> {
        let config = self.ctx.config.get();

        if items.is_empty() {
            return Err(SubmitError::EmptyBatch.into());
        }
        let max = config.processing_limits.max_items_per_batch;
        if items.len() > max {
            return Err(SubmitError::TooManyItems {
                count: items.len(),
                max,
            }
            .into());
        }
        for (index, item) in items.iter().enumerate() {
            if let Err(reason) = parse_item_url(&item.url) {
                return Err(SubmitError::InvalidUrl {
                    index,
                    url: sanitize::redact_raw_url(&item.url),
                    reason,
                }
                .into());
            }
        }
        let settings = settings.unwrap_or_default();
        settings.validate().map_err(SubmitError::InvalidSettings)?;

        let job = Job::new(
            owner_id,
            items,
            settings,
            priority.unwrap_or_default(),
            Utc::now(),
        );
        let job_id = job.id.clone();
        let submitted = job.clone();
        self.ctx.table.insert_if(job, |stats, job| {
            let live = stats.live();
            if live >= config.max_queue_size {
                return Err(LinkQueueError::from(SubmitError::QueueFull {
                    size: live,
                    max: config.max_queue_size,
                }));
            }
            self.ctx.repository.upsert_job(job)?;
            Ok(())
        })?;

        log::info!(
            "Submitted {} job {} with {} items at {} priority",
            submitted.kind.as_str(),
            job_id,
            submitted.progress.total,
            submitted.priority
        );
        self.ctx
            .events
            .emit(&submitted, JobEventKind::Submitted, "Job queued");
        self.ctx.reschedule();
        self.pool.wake();
        Ok(job_id)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        self.ctx
            .table
            .get(job_id)
            .ok_or_else(|| LinkQueueError::JobNotFound(job_id.to_string()))
    }

    pub fn get_status(&self, job_id: &str) -> Result<JobStatusView> {
        Ok(self.get_job(job_id)?.status_view())
    }

    /// Lists the owner's jobs, newest first.
    pub fn list_jobs(&self, owner_id: &str, mut query: JobQuery) -> JobPage {
        query.owner_id = Some(owner_id.to_string());
        query.apply(self.ctx.table.snapshot_where(|j| query.matches(j)))
    }

    /// Results and summary of a completed job.
    pub fn get_results(&self, job_id: &str) -> Result<JobOutput> {
        let job = self.get_job(job_id)?;
        if job.status != JobStatus::Completed {
            return Err(ResultsError::NotCompleted {
                job_id: job.id,
                status: job.status,
            }
            .into());
        }
        job.output
            .ok_or_else(|| ResultsError::NoOutput(job_id.to_string()).into())
    }

    pub fn cancel(&self, owner_id: &str, job_id: &str) -> Result<()> {
        self.apply_command(owner_id, job_id, Command::Cancel)?;
        self.after_lifecycle_change();
        Ok(())
    }

    /// Applies one operation to each listed job independently.
    pub fn manage(&self, owner_id: &str, request: &ManageRequest) -> ManageOutcome {
        let mut outcome = ManageOutcome::default();
        let command = match request.command() {
            Ok(command) => command,
            Err(e) => {
                for job_id in &request.job_ids {
                    outcome.push_error(job_id, &e);
                }
                return outcome;
            }
        };

        for job_id in &request.job_ids {
            match self.apply_command(owner_id, job_id, command) {
                Ok(_) => outcome.succeeded.push(job_id.clone()),
                Err(e) => outcome.push_error(job_id, &e),
            }
        }
        if !outcome.succeeded.is_empty() {
            self.after_lifecycle_change();
        }
        log::info!(
            "{} on {} jobs: {} succeeded, {} failed",
            request.operation,
            request.job_ids.len(),
            outcome.succeeded.len(),
            outcome.errors.len()
        );
        outcome
    }

    fn apply_command(
        &self,
        owner_id: &str,
        job_id: &str,
        command: Command,
    ) -> std::result::Result<Applied, LifecycleError> {
        let now = Utc::now();
        let (applied, job) = self
            .ctx
            .table
            .update(job_id, |job| {
                let applied = lifecycle::apply(job, owner_id, command, now)?;
                self.ctx.persist(job);
                Ok::<_, LifecycleError>((applied, job.clone()))
            })
            .ok_or_else(|| LifecycleError::NotFound(job_id.to_string()))??;

        if applied.interrupted_worker.is_some() {
            self.pool.interrupt(job_id);
        }

        let (kind, message) = match command {
            Command::Pause => (JobEventKind::Paused, "Job paused".to_string()),
            Command::Resume => (JobEventKind::Resumed, "Job resumed".to_string()),
            Command::Cancel => (JobEventKind::Cancelled, "Job cancelled".to_string()),
            Command::Prioritize(p) => (
                JobEventKind::Reprioritized,
                format!("Priority changed to {}", p),
            ),
            Command::Reschedule(at) => (
                JobEventKind::Rescheduled,
                format!("Scheduled for {}", at.to_rfc3339()),
            ),
        };
        self.ctx.events.emit(&job, kind, message);
        Ok(applied)
    }

    fn after_lifecycle_change(&self) {
        self.ctx.reschedule();
        self.pool.wake();
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        let config = self.ctx.config.get();
        let jobs = self.ctx.table.snapshot();
        let mut pending_by_priority = PriorityDistribution::default();
        let mut occupancy = 0;
        for job in &jobs {
            match job.status {
                JobStatus::Pending => pending_by_priority.add(job.priority),
                JobStatus::Processing => occupancy += 1,
                _ => {}
            }
        }
        let queue_length: usize = JobPriority::ALL
            .into_iter()
            .map(|p| pending_by_priority.count(p))
            .sum();

        QueueStatus {
            capacity: config.max_concurrent_jobs,
            occupancy,
            available_slots: config.max_concurrent_jobs.saturating_sub(occupancy),
            queue_length,
            max_queue_size: config.max_queue_size,
            pending_by_priority,
            wait_estimates: self
                .ctx
                .scheduler
                .wait_estimates(&jobs, &config, Utc::now()),
        }
    }

    /// Takes a snapshot, records and persists it, and returns it with the
    /// recent history.
    pub fn get_metrics(&self) -> Result<MetricsReport> {
        let config = self.ctx.config.get();
        let snapshot = self
            .metrics
            .snapshot(&self.ctx.table.snapshot(), &config, Utc::now());
        let max_len = config.maintenance.max_metrics_history;
        self.ctx.repository.append_metrics(&snapshot, max_len)?;
        self.metrics.record(snapshot.clone(), max_len);
        Ok(MetricsReport {
            current: snapshot,
            history: self.metrics.recent(RECENT_SNAPSHOTS),
        })
    }

    /// Merges `patch` onto the current config, validates and persists it,
    /// and resizes the worker pool.
    pub fn update_config(&self, patch: &QueueConfigPatch) -> Result<QueueConfig> {
        let current = self.ctx.config.get();
        let updated = patch.apply(&current)?;
        self.ctx.repository.save_config(&updated)?;
        self.ctx.config.set(updated.clone());

        if updated.max_concurrent_jobs != current.max_concurrent_jobs {
            self.pool.resize(updated.max_concurrent_jobs);
        }
        self.ctx.reschedule();
        self.pool.wake();
        log::info!("Queue config updated");
        Ok(updated)
    }

    /// Removes terminal jobs past their retention window.
    pub fn cleanup(
        &self,
        cleanup_type: CleanupType,
        older_than_days: Option<u32>,
    ) -> Result<CleanupReport> {
        if let Some(days) = older_than_days {
            check_range("older_than_days", days, 0, MAX_RETENTION_DAYS)?;
        }
        let config = self.ctx.config.get();
        let report = self.sweeper.sweep(
            &self.ctx.table,
            self.ctx.repository.as_ref(),
            cleanup_type,
            older_than_days,
            &config.maintenance,
            Utc::now(),
        )?;
        for job in &report.removed_jobs {
            self.ctx
                .events
                .emit(job, JobEventKind::Removed, format!("Removed by {} cleanup", cleanup_type));
        }
        Ok(report)
    }
}
