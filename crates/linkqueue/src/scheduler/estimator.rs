//! Start-time estimation strategies.

use chrono::{DateTime, Duration, Utc};

use crate::job::{Job, JobKind};

/// Predicts how long jobs take. The scheduler builds start-time estimates
/// from these predictions.
pub trait StartTimeEstimator: Send + Sync {
    /// Predicted run time of the job's remaining items.
    fn predicted_duration(&self, job: &Job) -> Duration;

    /// Predicted time left for a running job.
    fn predicted_remaining(&self, job: &Job, now: DateTime<Utc>) -> Duration {
        let total = self.predicted_duration(job);
        match (job.kind, job.started_at) {
            (JobKind::Single, Some(started)) => {
                let elapsed = now.signed_duration_since(started);
                (total - elapsed).max(Duration::zero())
            }
            _ => total,
        }
    }
}

/// Fixed per-job and per-item rates.
#[derive(Debug, Clone, Copy)]
pub struct FixedRateEstimator {
    pub single_job: Duration,
    pub per_batch_item: Duration,
}

impl Default for FixedRateEstimator {
    fn default() -> Self {
        Self {
            single_job: Duration::seconds(30),
            per_batch_item: Duration::seconds(5),
        }
    }
}

impl StartTimeEstimator for FixedRateEstimator {
    fn predicted_duration(&self, job: &Job) -> Duration {
        match job.kind {
            JobKind::Single => self.single_job,
            JobKind::Batch => {
                let remaining = job.progress.remaining().max(1);
                self.per_batch_item * remaining as i32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingSettings;
    use crate::job::{Item, JobPriority, JobStatus};

    fn job(items: usize) -> Job {
        let items = (0..items)
            .map(|i| Item::new(format!("https://example.com/{i}")))
            .collect();
        Job::new("u", items, ProcessingSettings::default(), JobPriority::Normal, Utc::now())
    }

    #[test]
    fn test_fixed_rates() {
        let estimator = FixedRateEstimator::default();
        assert_eq!(estimator.predicted_duration(&job(1)), Duration::seconds(30));
        assert_eq!(estimator.predicted_duration(&job(4)), Duration::seconds(20));
    }

    #[test]
    fn test_batch_prediction_uses_remaining_items() {
        let estimator = FixedRateEstimator::default();
        let mut j = job(4);
        j.progress.processed = 3;
        assert_eq!(estimator.predicted_duration(&j), Duration::seconds(5));
    }

    #[test]
    fn test_running_single_job_subtracts_elapsed() {
        let estimator = FixedRateEstimator::default();
        let now = Utc::now();
        let mut j = job(1);
        j.status = JobStatus::Processing;
        j.started_at = Some(now - Duration::seconds(10));
        assert_eq!(estimator.predicted_remaining(&j, now), Duration::seconds(20));

        j.started_at = Some(now - Duration::seconds(90));
        assert_eq!(estimator.predicted_remaining(&j, now), Duration::zero());
    }
}
