//! Immutable queue health snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobPriority, JobStatus};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl QueueStats {
    pub fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Paused => self.paused += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
        self.total += 1;
    }

    pub fn count(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Processing => self.processing,
            JobStatus::Paused => self.paused,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    /// Jobs that still occupy queue capacity.
    pub fn live(&self) -> usize {
        self.pending + self.processing + self.paused
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PriorityDistribution {
    pub low: usize,
    pub normal: usize,
    pub high: usize,
    pub urgent: usize,
}

impl PriorityDistribution {
    pub fn add(&mut self, priority: JobPriority) {
        match priority {
            JobPriority::Low => self.low += 1,
            JobPriority::Normal => self.normal += 1,
            JobPriority::High => self.high += 1,
            JobPriority::Urgent => self.urgent += 1,
        }
    }

    pub fn count(&self, priority: JobPriority) -> usize {
        match priority {
            JobPriority::Low => self.low,
            JobPriority::Normal => self.normal,
            JobPriority::High => self.high,
            JobPriority::Urgent => self.urgent,
        }
    }
}

/// Trailing 24-hour performance figures. Times are in seconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub average_processing_time: f64,
    pub average_queue_wait_time: f64,
    pub throughput_per_hour: f64,
    pub success_rate: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub active_workers: usize,
    pub max_workers: usize,
    pub worker_utilization: f64,
    pub cpu_time_ms: u64,
    pub memory_peak_bytes: u64,
    pub api_calls: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BottleneckFlags {
    pub queue_full: bool,
    pub slow_processing: bool,
    pub high_error_rate: bool,
    pub capacity_saturated: bool,
}

impl BottleneckFlags {
    pub fn any(&self) -> bool {
        self.queue_full || self.slow_processing || self.high_error_rate || self.capacity_saturated
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    pub timestamp: DateTime<Utc>,
    pub queue_stats: QueueStats,
    pub priority_distribution: PriorityDistribution,
    pub performance_metrics: PerformanceMetrics,
    pub resource_usage: ResourceSnapshot,
    pub bottlenecks: BottleneckFlags,
}
