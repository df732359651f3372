use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use super::probe::{JobUsageProbe, ResourceProbe};
use super::snapshot::{
    BottleneckFlags, PerformanceMetrics, PriorityDistribution, QueueMetrics, QueueStats,
    ResourceSnapshot,
};
use crate::config::QueueConfig;
use crate::job::{Job, JobStatus};

/// Trailing window for performance figures.
pub const WINDOW_HOURS: i64 = 24;
/// Snapshots returned alongside the current one.
pub const RECENT_SNAPSHOTS: usize = 24;

const QUEUE_FULL_PENDING: usize = 50;
const SLOW_PROCESSING_SECS: f64 = 300.0;
const HIGH_ERROR_RATE: f64 = 20.0;

/// Builds queue metrics snapshots and keeps a bounded history of them.
pub struct MetricsAggregator {
    probe: Arc<dyn ResourceProbe>,
    history: RwLock<VecDeque<QueueMetrics>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(Arc::new(JobUsageProbe))
    }
}

impl MetricsAggregator {
    pub fn new(probe: Arc<dyn ResourceProbe>) -> Self {
        Self {
            probe,
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Seeds the history, oldest first, as loaded from storage.
    pub fn with_history(mut self, history: Vec<QueueMetrics>) -> Self {
        self.history = RwLock::new(history.into());
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<QueueMetrics>> {
        match self.history.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Metrics history lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<QueueMetrics>> {
        match self.history.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Metrics history lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Builds a snapshot of `jobs` at `now`.
    pub fn snapshot(&self, jobs: &[Job], config: &QueueConfig, now: DateTime<Utc>) -> QueueMetrics {
        let mut queue_stats = QueueStats::default();
        let mut priority_distribution = PriorityDistribution::default();
        for job in jobs {
            queue_stats.add(job.status);
            priority_distribution.add(job.priority);
        }

        let performance_metrics = performance(jobs, now);

        let usage = self.probe.sample(jobs);
        let max_workers = config.max_concurrent_jobs;
        let active_workers = queue_stats.processing;
        let worker_utilization = if max_workers == 0 {
            0.0
        } else {
            active_workers as f64 * 100.0 / max_workers as f64
        };
        let resource_usage = ResourceSnapshot {
            active_workers,
            max_workers,
            worker_utilization,
            cpu_time_ms: usage.cpu_time_ms,
            memory_peak_bytes: usage.memory_peak_bytes,
            api_calls: usage.api_calls,
        };

        let bottlenecks = BottleneckFlags {
            queue_full: queue_stats.pending > QUEUE_FULL_PENDING,
            slow_processing: performance_metrics.average_processing_time > SLOW_PROCESSING_SECS,
            high_error_rate: performance_metrics.error_rate > HIGH_ERROR_RATE,
            capacity_saturated: active_workers >= max_workers && queue_stats.pending > 0,
        };

        QueueMetrics {
            timestamp: now,
            queue_stats,
            priority_distribution,
            performance_metrics,
            resource_usage,
            bottlenecks,
        }
    }

    /// Appends a snapshot, evicting the oldest past `max_len`.
    pub fn record(&self, snapshot: QueueMetrics, max_len: usize) {
        let mut history = self.write();
        history.push_back(snapshot);
        while history.len() > max_len.max(1) {
            history.pop_front();
        }
    }

    /// The last `n` snapshots, oldest first.
    pub fn recent(&self, n: usize) -> Vec<QueueMetrics> {
        let history = self.read();
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.read().len()
    }
}

fn seconds(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn performance(jobs: &[Job], now: DateTime<Utc>) -> PerformanceMetrics {
    let since = now - Duration::hours(WINDOW_HOURS);
    let window: Vec<&Job> = jobs.iter().filter(|j| j.created_at >= since).collect();

    let processing_times: Vec<f64> = window
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .filter_map(|j| Some(seconds(j.completed_at? - j.started_at?)))
        .collect();
    let wait_times: Vec<f64> = window
        .iter()
        .filter_map(|j| j.started_at.map(|s| seconds(s - j.created_at)))
        .collect();

    let completed = window
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .count();
    let failed = window
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    let finished = completed + failed;
    let (success_rate, error_rate) = if finished == 0 {
        (0.0, 0.0)
    } else {
        (
            completed as f64 * 100.0 / finished as f64,
            failed as f64 * 100.0 / finished as f64,
        )
    };

    PerformanceMetrics {
        average_processing_time: mean(&processing_times),
        average_queue_wait_time: mean(&wait_times),
        throughput_per_hour: completed as f64 / WINDOW_HOURS as f64,
        success_rate,
        error_rate,
    }
}
