use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

use crate::error::ConfigError;
use crate::job::{JobKind, JobPriority, JobStatus};

/// Process-wide queue tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default)]
    pub priority_weights: PriorityWeights,
    #[serde(default)]
    pub processing_limits: ProcessingLimits,
    #[serde(default)]
    pub resource_allocation: ResourceAllocation,
    #[serde(default)]
    pub auto_scaling: AutoScaling,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_max_queue_size() -> usize {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_queue_size: default_max_queue_size(),
            priority_weights: PriorityWeights::default(),
            processing_limits: ProcessingLimits::default(),
            resource_allocation: ResourceAllocation::default(),
            auto_scaling: AutoScaling::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Checks every field against its bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_concurrent_jobs", self.max_concurrent_jobs, 1, 64)?;
        check_range("max_queue_size", self.max_queue_size, 1, 100_000)?;
        self.priority_weights.validate()?;
        self.processing_limits.validate()?;
        self.resource_allocation.validate()?;
        self.auto_scaling.validate()?;
        self.maintenance.validate()?;
        Ok(())
    }

    /// Wall-clock limit for a whole job of the given kind.
    pub fn timeout_for(&self, kind: JobKind) -> Duration {
        let secs = match kind {
            JobKind::Single => self.processing_limits.single_job_timeout_secs,
            JobKind::Batch => self.processing_limits.batch_job_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityWeights {
    #[serde(default = "default_weight_low")]
    pub low: u32,
    #[serde(default = "default_weight_normal")]
    pub normal: u32,
    #[serde(default = "default_weight_high")]
    pub high: u32,
    #[serde(default = "default_weight_urgent")]
    pub urgent: u32,
}

fn default_weight_low() -> u32 {
    1
}

fn default_weight_normal() -> u32 {
    2
}

fn default_weight_high() -> u32 {
    3
}

fn default_weight_urgent() -> u32 {
    4
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            low: default_weight_low(),
            normal: default_weight_normal(),
            high: default_weight_high(),
            urgent: default_weight_urgent(),
        }
    }
}

impl PriorityWeights {
    pub fn weight(&self, priority: JobPriority) -> u32 {
        match priority {
            JobPriority::Low => self.low,
            JobPriority::Normal => self.normal,
            JobPriority::High => self.high,
            JobPriority::Urgent => self.urgent,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_range("priority_weights.low", self.low, 0, 100)?;
        check_range("priority_weights.normal", self.normal, 0, 100)?;
        check_range("priority_weights.high", self.high, 0, 100)?;
        check_range("priority_weights.urgent", self.urgent, 0, 100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessingLimits {
    #[serde(default = "default_single_job_timeout")]
    pub single_job_timeout_secs: u64,
    #[serde(default = "default_batch_job_timeout")]
    pub batch_job_timeout_secs: u64,
    #[serde(default = "default_max_items_per_batch")]
    pub max_items_per_batch: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
}

fn default_single_job_timeout() -> u64 {
    300
}

fn default_batch_job_timeout() -> u64 {
    1800
}

fn default_max_items_per_batch() -> usize {
    100
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_stage_timeout() -> u64 {
    30
}

impl Default for ProcessingLimits {
    fn default() -> Self {
        Self {
            single_job_timeout_secs: default_single_job_timeout(),
            batch_job_timeout_secs: default_batch_job_timeout(),
            max_items_per_batch: default_max_items_per_batch(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            stage_timeout_secs: default_stage_timeout(),
        }
    }
}

impl ProcessingLimits {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "processing_limits.single_job_timeout_secs",
            self.single_job_timeout_secs,
            10,
            3600,
        )?;
        check_range(
            "processing_limits.batch_job_timeout_secs",
            self.batch_job_timeout_secs,
            60,
            86_400,
        )?;
        check_range(
            "processing_limits.max_items_per_batch",
            self.max_items_per_batch,
            1,
            1000,
        )?;
        check_range("processing_limits.retry_attempts", self.retry_attempts, 0, 10)?;
        check_range("processing_limits.retry_delay_ms", self.retry_delay_ms, 0, 60_000)?;
        check_range(
            "processing_limits.stage_timeout_secs",
            self.stage_timeout_secs,
            1,
            600,
        )
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

/// Resource caps. Advisory: reported alongside metrics, not enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceAllocation {
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: u32,
    #[serde(default = "default_max_api_calls")]
    pub max_api_calls_per_minute: u32,
}

fn default_max_memory_mb() -> u64 {
    1024
}

fn default_max_cpu_percent() -> u32 {
    80
}

fn default_max_api_calls() -> u32 {
    60
}

impl Default for ResourceAllocation {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory_mb(),
            max_cpu_percent: default_max_cpu_percent(),
            max_api_calls_per_minute: default_max_api_calls(),
        }
    }
}

impl ResourceAllocation {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "resource_allocation.max_memory_mb",
            self.max_memory_mb,
            64,
            65_536,
        )?;
        check_range(
            "resource_allocation.max_cpu_percent",
            self.max_cpu_percent,
            1,
            100,
        )?;
        check_range(
            "resource_allocation.max_api_calls_per_minute",
            self.max_api_calls_per_minute,
            1,
            10_000,
        )
    }
}

/// Scaling thresholds. Stored and validated but never acted on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoScaling {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: u32,
    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: u32,
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_scale_up_threshold() -> u32 {
    10
}

fn default_scale_down_threshold() -> u32 {
    2
}

fn default_min_workers() -> usize {
    1
}

fn default_max_workers() -> usize {
    10
}

impl Default for AutoScaling {
    fn default() -> Self {
        Self {
            enabled: false,
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
        }
    }
}

impl AutoScaling {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.scale_down_threshold > self.scale_up_threshold {
            return Err(ConfigError::Validation {
                message: format!(
                    "auto_scaling.scale_down_threshold ({}) exceeds scale_up_threshold ({})",
                    self.scale_down_threshold, self.scale_up_threshold
                ),
            });
        }
        check_range("auto_scaling.min_workers", self.min_workers, 1, 64)?;
        check_range("auto_scaling.max_workers", self.max_workers, 1, 64)?;
        if self.min_workers > self.max_workers {
            return Err(ConfigError::Validation {
                message: format!(
                    "auto_scaling.min_workers ({}) exceeds max_workers ({})",
                    self.min_workers, self.max_workers
                ),
            });
        }
        Ok(())
    }
}

/// Upper bound for every retention window, in days.
pub const MAX_RETENTION_DAYS: u32 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceConfig {
    #[serde(default = "default_completed_retention")]
    pub cleanup_completed_jobs_after_days: u32,
    #[serde(default = "default_failed_retention")]
    pub cleanup_failed_jobs_after_days: u32,
    #[serde(default = "default_cancelled_retention")]
    pub cleanup_cancelled_jobs_after_days: u32,
    #[serde(default = "default_max_metrics_history")]
    pub max_metrics_history: usize,
}

fn default_completed_retention() -> u32 {
    7
}

fn default_failed_retention() -> u32 {
    30
}

fn default_cancelled_retention() -> u32 {
    7
}

fn default_max_metrics_history() -> usize {
    1000
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_completed_jobs_after_days: default_completed_retention(),
            cleanup_failed_jobs_after_days: default_failed_retention(),
            cleanup_cancelled_jobs_after_days: default_cancelled_retention(),
            max_metrics_history: default_max_metrics_history(),
        }
    }
}

impl MaintenanceConfig {
    /// Retention window for a terminal status. `None` for live statuses.
    pub fn retention_days(&self, status: JobStatus) -> Option<u32> {
        match status {
            JobStatus::Completed => Some(self.cleanup_completed_jobs_after_days),
            JobStatus::Failed => Some(self.cleanup_failed_jobs_after_days),
            JobStatus::Cancelled => Some(self.cleanup_cancelled_jobs_after_days),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "maintenance.cleanup_completed_jobs_after_days",
            self.cleanup_completed_jobs_after_days,
            0,
            MAX_RETENTION_DAYS,
        )?;
        check_range(
            "maintenance.cleanup_failed_jobs_after_days",
            self.cleanup_failed_jobs_after_days,
            0,
            MAX_RETENTION_DAYS,
        )?;
        check_range(
            "maintenance.cleanup_cancelled_jobs_after_days",
            self.cleanup_cancelled_jobs_after_days,
            0,
            MAX_RETENTION_DAYS,
        )?;
        check_range(
            "maintenance.max_metrics_history",
            self.max_metrics_history,
            1,
            100_000,
        )
    }
}

pub(crate) fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + Display,
{
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            bounds: format!("{}..={}", min, max),
        })
    }
}
