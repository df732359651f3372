//! Sources for the resource section of a metrics snapshot.

use crate::job::{Job, JobStatus, ResourceUsage};

/// Reports resource consumption for the current job set.
pub trait ResourceProbe: Send + Sync {
    fn sample(&self, jobs: &[Job]) -> ResourceUsage;
}

/// Sums the counters workers accumulate on running jobs. Memory is the
/// largest per-job peak.
#[derive(Debug, Default, Clone, Copy)]
pub struct JobUsageProbe;

impl ResourceProbe for JobUsageProbe {
    fn sample(&self, jobs: &[Job]) -> ResourceUsage {
        jobs.iter()
            .filter(|j| j.status == JobStatus::Processing)
            .fold(ResourceUsage::default(), |mut acc, job| {
                let usage = &job.resource_usage;
                acc.cpu_time_ms += usage.cpu_time_ms;
                acc.api_calls += usage.api_calls;
                acc.memory_peak_bytes = acc.memory_peak_bytes.max(usage.memory_peak_bytes);
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingSettings;
    use crate::job::{Item, JobPriority};
    use chrono::Utc;

    fn job(status: JobStatus, cpu: u64, memory: u64, calls: u64) -> Job {
        let mut job = Job::new(
            "user-1",
            vec![Item::new("https://example.com")],
            ProcessingSettings::default(),
            JobPriority::Normal,
            Utc::now(),
        );
        job.status = status;
        job.resource_usage = ResourceUsage {
            cpu_time_ms: cpu,
            memory_peak_bytes: memory,
            api_calls: calls,
        };
        job
    }

    #[test]
    fn test_only_running_jobs_count() {
        let jobs = vec![
            job(JobStatus::Processing, 100, 2048, 3),
            job(JobStatus::Processing, 50, 4096, 2),
            job(JobStatus::Completed, 1000, 1 << 20, 40),
        ];
        let usage = JobUsageProbe.sample(&jobs);
        assert_eq!(usage.cpu_time_ms, 150);
        assert_eq!(usage.api_calls, 5);
        assert_eq!(usage.memory_peak_bytes, 4096);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(JobUsageProbe.sample(&[]), ResourceUsage::default());
    }
}
