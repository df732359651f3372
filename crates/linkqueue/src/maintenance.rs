//! Retention-based removal of terminal jobs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MaintenanceConfig;
use crate::db::DatabaseError;
use crate::job::{Job, JobStatus};
use crate::store::{JobRepository, JobTable};

/// Which terminal jobs a cleanup run considers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleanupType {
    Completed,
    Failed,
    Cancelled,
    All,
}

impl CleanupType {
    pub fn statuses(self) -> &'static [JobStatus] {
        match self {
            CleanupType::Completed => &[JobStatus::Completed],
            CleanupType::Failed => &[JobStatus::Failed],
            CleanupType::Cancelled => &[JobStatus::Cancelled],
            CleanupType::All => &[JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CleanupType::Completed => "completed",
            CleanupType::Failed => "failed",
            CleanupType::Cancelled => "cancelled",
            CleanupType::All => "all",
        }
    }
}

impl fmt::Display for CleanupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "completed" => Ok(CleanupType::Completed),
            "failed" => Ok(CleanupType::Failed),
            "cancelled" => Ok(CleanupType::Cancelled),
            "all" => Ok(CleanupType::All),
            other => Err(format!("Unknown cleanup type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed: usize,
    pub remaining: usize,
    /// The removed jobs, for persistence and event fan-out.
    #[serde(skip)]
    pub removed_jobs: Vec<Job>,
}

/// Decides which terminal jobs have outlived their retention window.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sweeper;

impl Sweeper {
    /// True when `job` is due for removal under `cleanup_type`.
    /// `older_than_days` replaces the configured window for every status.
    pub fn is_expired(
        job: &Job,
        cleanup_type: CleanupType,
        older_than_days: Option<u32>,
        retention: &MaintenanceConfig,
        now: DateTime<Utc>,
    ) -> bool {
        if !cleanup_type.statuses().contains(&job.status) {
            return false;
        }
        let Some(days) = older_than_days.or_else(|| retention.retention_days(job.status)) else {
            return false;
        };
        // A cutoff before the earliest representable time matches nothing.
        let Some(cutoff) = now.checked_sub_signed(Duration::days(i64::from(days))) else {
            return false;
        };
        job.completed_at.unwrap_or(job.created_at) <= cutoff
    }

    /// Deletes expired jobs from `repository`, then drops them from `table`.
    /// A failed delete leaves both untouched.
    pub fn sweep(
        &self,
        table: &JobTable,
        repository: &dyn JobRepository,
        cleanup_type: CleanupType,
        older_than_days: Option<u32>,
        retention: &MaintenanceConfig,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, DatabaseError> {
        let ids: Vec<String> = table
            .snapshot_where(|job| {
                Self::is_expired(job, cleanup_type, older_than_days, retention, now)
            })
            .into_iter()
            .map(|job| job.id)
            .collect();
        if !ids.is_empty() {
            repository.delete_jobs(&ids)?;
        }

        // Terminal jobs never change status, so the ids are still expired.
        let removed = table.remove_ids(&ids);
        let report = CleanupReport {
            removed: removed.len(),
            remaining: table.len(),
            removed_jobs: removed,
        };
        log::info!(
            "Cleanup ({}) removed {} jobs, {} remaining",
            cleanup_type,
            report.removed,
            report.remaining
        );
        Ok(report)
    }
}
