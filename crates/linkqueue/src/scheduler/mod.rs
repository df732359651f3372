//! Priority ordering, queue positions and start-time estimates.
//!
//! Planning is a pure function of the job set, the config and `now`.
//! [`Scheduler::apply`] writes the plan back, touching only jobs that are
//! still pending when their lock is taken.

pub mod estimator;

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::{PriorityWeights, QueueConfig};
use crate::job::{Job, JobPriority, JobStatus};
use crate::store::JobTable;

pub use estimator::{FixedRateEstimator, StartTimeEstimator};

/// Position and estimate computed for one pending job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub job_id: String,
    pub position: usize,
    pub estimated_start_time: DateTime<Utc>,
}

/// Coarse classification of an expected wait.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaitBand {
    Immediate,
    Short,
    Medium,
    Long,
}

impl WaitBand {
    pub fn for_wait(wait: Duration) -> Self {
        if wait < Duration::minutes(1) {
            WaitBand::Immediate
        } else if wait < Duration::minutes(15) {
            WaitBand::Short
        } else if wait < Duration::hours(1) {
            WaitBand::Medium
        } else {
            WaitBand::Long
        }
    }
}

/// Expected wait for a job submitted now at a given priority.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WaitEstimate {
    pub priority: JobPriority,
    pub estimated_wait_secs: i64,
    pub band: WaitBand,
}

/// Ranking order: weight descending, then oldest first, then id.
pub fn compare_rank(a: &Job, b: &Job, weights: &PriorityWeights) -> Ordering {
    weights
        .weight(b.priority)
        .cmp(&weights.weight(a.priority))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Pending jobs in admission order.
pub fn rank_pending<'a>(jobs: &'a [Job], weights: &PriorityWeights) -> Vec<&'a Job> {
    let mut pending: Vec<&Job> = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Pending)
        .collect();
    pending.sort_by(|a, b| compare_rank(a, b, weights));
    pending
}

pub struct Scheduler {
    estimator: Arc<dyn StartTimeEstimator>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Arc::new(FixedRateEstimator::default()))
    }
}

impl Scheduler {
    pub fn new(estimator: Arc<dyn StartTimeEstimator>) -> Self {
        Self { estimator }
    }

    fn available_slots(jobs: &[Job], config: &QueueConfig) -> usize {
        let processing = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Processing)
            .count();
        config.max_concurrent_jobs.saturating_sub(processing)
    }

    /// Running total carried into the first waiting rank. Jobs admitted
    /// right away count in full. With no free slot, it is the shortest
    /// remaining time among running jobs, at least 1s.
    fn waiting_seed(&self, jobs: &[Job], admitted_now: &[&Job], now: DateTime<Utc>) -> Duration {
        if !admitted_now.is_empty() {
            return admitted_now
                .iter()
                .fold(Duration::zero(), |acc, j| acc + self.estimator.predicted_duration(j));
        }
        jobs.iter()
            .filter(|j| j.status == JobStatus::Processing)
            .map(|j| self.estimator.predicted_remaining(j, now))
            .min()
            .unwrap_or_else(Duration::zero)
            .max(Duration::seconds(1))
    }

    /// Computes positions and estimates for every pending job, in rank order.
    pub fn plan(&self, jobs: &[Job], config: &QueueConfig, now: DateTime<Utc>) -> Vec<PlanEntry> {
        let ranked = rank_pending(jobs, &config.priority_weights);
        let available = Self::available_slots(jobs, config).min(ranked.len());
        let (immediate, waiting) = ranked.split_at(available);

        let with_schedule = |job: &Job, estimate: DateTime<Utc>| match job.scheduled_for {
            Some(at) if at > estimate => at,
            _ => estimate,
        };

        let mut entries: Vec<PlanEntry> = immediate
            .iter()
            .enumerate()
            .map(|(rank, job)| PlanEntry {
                job_id: job.id.clone(),
                position: rank + 1,
                estimated_start_time: with_schedule(*job, now),
            })
            .collect();

        let mut running = self.waiting_seed(jobs, immediate, now);
        for (offset, job) in waiting.iter().enumerate() {
            entries.push(PlanEntry {
                job_id: job.id.clone(),
                position: available + offset + 1,
                estimated_start_time: with_schedule(*job, now + running),
            });
            running = running + self.estimator.predicted_duration(job);
        }

        entries
    }

    /// Writes the plan into the table. Jobs that left `pending` since the
    /// snapshot are left alone. Returns the number of jobs updated.
    pub fn apply(&self, table: &JobTable, config: &QueueConfig, now: DateTime<Utc>) -> usize {
        let jobs = table.snapshot();
        let entries = self.plan(&jobs, config, now);
        let mut updated = 0;
        for entry in entries {
            let wrote = table.update(&entry.job_id, |job| {
                if job.status != JobStatus::Pending {
                    return false;
                }
                job.queue_position = Some(entry.position);
                job.estimated_start_time = Some(entry.estimated_start_time);
                true
            });
            if wrote == Some(true) {
                updated += 1;
            }
        }
        log::debug!("Scheduler updated {} pending jobs", updated);
        updated
    }

    /// Expected wait for a new job at each priority.
    pub fn wait_estimates(
        &self,
        jobs: &[Job],
        config: &QueueConfig,
        now: DateTime<Utc>,
    ) -> Vec<WaitEstimate> {
        let weights = &config.priority_weights;
        let ranked = rank_pending(jobs, weights);
        let available = Self::available_slots(jobs, config);
        let immediate = &ranked[..available.min(ranked.len())];
        let seed = self.waiting_seed(jobs, immediate, now);

        JobPriority::ALL
            .into_iter()
            .map(|priority| {
                let weight = weights.weight(priority);
                let ahead = ranked
                    .iter()
                    .take_while(|j| weights.weight(j.priority) >= weight)
                    .count();
                let wait = if ahead < available {
                    Duration::zero()
                } else {
                    ranked[available..ahead]
                        .iter()
                        .fold(seed, |acc, j| acc + self.estimator.predicted_duration(j))
                };
                WaitEstimate {
                    priority,
                    estimated_wait_secs: wait.num_seconds(),
                    band: WaitBand::for_wait(wait),
                }
            })
            .collect()
    }
}
