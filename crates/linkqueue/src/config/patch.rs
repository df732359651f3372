//! Partial config updates.

use serde::{Deserialize, Serialize};

use super::schema::QueueConfig;
use crate::error::ConfigError;

/// A partial [`QueueConfig`]. `None` leaves the current value in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueConfigPatch {
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
    #[serde(default)]
    pub max_queue_size: Option<usize>,
    #[serde(default)]
    pub priority_weights: Option<PriorityWeightsPatch>,
    #[serde(default)]
    pub processing_limits: Option<ProcessingLimitsPatch>,
    #[serde(default)]
    pub resource_allocation: Option<ResourceAllocationPatch>,
    #[serde(default)]
    pub auto_scaling: Option<AutoScalingPatch>,
    #[serde(default)]
    pub maintenance: Option<MaintenancePatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriorityWeightsPatch {
    pub low: Option<u32>,
    pub normal: Option<u32>,
    pub high: Option<u32>,
    pub urgent: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessingLimitsPatch {
    pub single_job_timeout_secs: Option<u64>,
    pub batch_job_timeout_secs: Option<u64>,
    pub max_items_per_batch: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub stage_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceAllocationPatch {
    pub max_memory_mb: Option<u64>,
    pub max_cpu_percent: Option<u32>,
    pub max_api_calls_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AutoScalingPatch {
    pub enabled: Option<bool>,
    pub scale_up_threshold: Option<u32>,
    pub scale_down_threshold: Option<u32>,
    pub min_workers: Option<usize>,
    pub max_workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MaintenancePatch {
    pub cleanup_completed_jobs_after_days: Option<u32>,
    pub cleanup_failed_jobs_after_days: Option<u32>,
    pub cleanup_cancelled_jobs_after_days: Option<u32>,
    pub max_metrics_history: Option<usize>,
}

fn merge<T: Copy>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl QueueConfigPatch {
    /// Merges the patch onto `base` and validates the result as a whole.
    /// `base` is left untouched when validation fails.
    pub fn apply(&self, base: &QueueConfig) -> Result<QueueConfig, ConfigError> {
        let mut config = base.clone();

        merge(&mut config.max_concurrent_jobs, self.max_concurrent_jobs);
        merge(&mut config.max_queue_size, self.max_queue_size);

        if let Some(p) = &self.priority_weights {
            let w = &mut config.priority_weights;
            merge(&mut w.low, p.low);
            merge(&mut w.normal, p.normal);
            merge(&mut w.high, p.high);
            merge(&mut w.urgent, p.urgent);
        }

        if let Some(p) = &self.processing_limits {
            let l = &mut config.processing_limits;
            merge(&mut l.single_job_timeout_secs, p.single_job_timeout_secs);
            merge(&mut l.batch_job_timeout_secs, p.batch_job_timeout_secs);
            merge(&mut l.max_items_per_batch, p.max_items_per_batch);
            merge(&mut l.retry_attempts, p.retry_attempts);
            merge(&mut l.retry_delay_ms, p.retry_delay_ms);
            merge(&mut l.stage_timeout_secs, p.stage_timeout_secs);
        }

        if let Some(p) = &self.resource_allocation {
            let r = &mut config.resource_allocation;
            merge(&mut r.max_memory_mb, p.max_memory_mb);
            merge(&mut r.max_cpu_percent, p.max_cpu_percent);
            merge(&mut r.max_api_calls_per_minute, p.max_api_calls_per_minute);
        }

        if let Some(p) = &self.auto_scaling {
            let a = &mut config.auto_scaling;
            merge(&mut a.enabled, p.enabled);
            merge(&mut a.scale_up_threshold, p.scale_up_threshold);
            merge(&mut a.scale_down_threshold, p.scale_down_threshold);
            merge(&mut a.min_workers, p.min_workers);
            merge(&mut a.max_workers, p.max_workers);
        }

        if let Some(p) = &self.maintenance {
            let m = &mut config.maintenance;
            merge(
                &mut m.cleanup_completed_jobs_after_days,
                p.cleanup_completed_jobs_after_days,
            );
            merge(
                &mut m.cleanup_failed_jobs_after_days,
                p.cleanup_failed_jobs_after_days,
            );
            merge(
                &mut m.cleanup_cancelled_jobs_after_days,
                p.cleanup_cancelled_jobs_after_days,
            );
            merge(&mut m.max_metrics_history, p.max_metrics_history);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patch_is_identity() {
        let base = QueueConfig::default();
        assert_eq!(QueueConfigPatch::default().apply(&base).unwrap(), base);
    }

    #[test]
    fn test_nested_patch_merges() {
        let patch: QueueConfigPatch = serde_json::from_str(
            r#"{"max_concurrent_jobs": 5, "priority_weights": {"urgent": 10}}"#,
        )
        .unwrap();

        let config = patch.apply(&QueueConfig::default()).unwrap();
        assert_eq!(config.max_concurrent_jobs, 5);
        assert_eq!(config.priority_weights.urgent, 10);
        assert_eq!(config.priority_weights.low, 1);
    }

    #[test]
    fn test_invalid_patch_is_rejected() {
        let patch = QueueConfigPatch {
            processing_limits: Some(ProcessingLimitsPatch {
                retry_attempts: Some(11),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = patch.apply(&QueueConfig::default()).unwrap_err();
        assert!(err.to_string().contains("processing_limits.retry_attempts"));
    }
}
