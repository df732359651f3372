//! Job storage: the durable repository interface and the live job table.

pub mod job_table;
pub mod memory;
pub mod sqlite;

use serde::Serialize;

use crate::config::QueueConfig;
use crate::db::DatabaseError;
use crate::job::{Job, JobPriority, JobStatus};
use crate::metrics::QueueMetrics;

pub use job_table::JobTable;
pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

/// Durable store for jobs, the queue config and metrics history.
pub trait JobRepository: Send + Sync {
    fn load_jobs(&self) -> Result<Vec<Job>, DatabaseError>;

    /// Overwrites the whole job collection.
    fn save_jobs(&self, jobs: &[Job]) -> Result<(), DatabaseError>;

    fn get_job(&self, id: &str) -> Result<Option<Job>, DatabaseError>;

    fn upsert_job(&self, job: &Job) -> Result<(), DatabaseError>;

    /// Returns the number of jobs actually removed.
    fn delete_jobs(&self, ids: &[String]) -> Result<usize, DatabaseError>;

    fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, DatabaseError>;

    fn load_config(&self) -> Result<Option<QueueConfig>, DatabaseError>;

    fn save_config(&self, config: &QueueConfig) -> Result<(), DatabaseError>;

    /// Stored snapshots, oldest first.
    fn load_metrics_history(&self) -> Result<Vec<QueueMetrics>, DatabaseError>;

    fn append_metrics(&self, snapshot: &QueueMetrics, max_len: usize)
        -> Result<(), DatabaseError>;
}

/// Listing filter. Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobQuery {
    pub owner_id: Option<String>,
    pub status: Option<JobStatus>,
    pub priority: Option<JobPriority>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl JobQuery {
    pub fn for_owner(owner_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.owner_id.as_deref().map_or(true, |o| job.owner_id == o)
            && self.status.map_or(true, |s| job.status == s)
            && self.priority.map_or(true, |p| job.priority == p)
    }

    /// Filters, orders and paginates an in-memory collection.
    pub fn apply(&self, jobs: Vec<Job>) -> JobPage {
        let mut matching: Vec<Job> = jobs.into_iter().filter(|j| self.matches(j)).collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let total = matching.len();
        let jobs = matching
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        JobPage { jobs, total }
    }
}

/// One page of a listing plus the unpaginated match count.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: usize,
}
