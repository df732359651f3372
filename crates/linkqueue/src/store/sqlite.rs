//! SQLite-backed repository.

use std::path::Path;

use super::{JobPage, JobQuery, JobRepository};
use crate::config::QueueConfig;
use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::{config_repo, metrics_repo, Database, DatabaseError};
use crate::job::Job;
use crate::metrics::QueueMetrics;

#[derive(Clone)]
pub struct SqliteRepository {
    db: Database,
}

impl SqliteRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn rows_to_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>, DatabaseError> {
    rows.into_iter().map(JobRow::into_job).collect()
}

impl JobRepository for SqliteRepository {
    fn load_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
        rows_to_jobs(job_repo::load_all(&self.db)?)
    }

    fn save_jobs(&self, jobs: &[Job]) -> Result<(), DatabaseError> {
        let rows = jobs
            .iter()
            .map(JobRow::from_job)
            .collect::<Result<Vec<_>, _>>()?;
        job_repo::replace_all(&self.db, &rows)
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        job_repo::find_by_id(&self.db, id)?
            .map(JobRow::into_job)
            .transpose()
    }

    fn upsert_job(&self, job: &Job) -> Result<(), DatabaseError> {
        job_repo::upsert(&self.db, &JobRow::from_job(job)?)
    }

    fn delete_jobs(&self, ids: &[String]) -> Result<usize, DatabaseError> {
        job_repo::delete_many(&self.db, ids)
    }

    fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, DatabaseError> {
        let filter = JobFilter {
            owner_id: query.owner_id.clone(),
            status: query.status.map(|s| s.as_str().to_string()),
            priority: query.priority.map(|p| p.as_str().to_string()),
            limit: query.limit.map(|l| l as u64),
            offset: Some(query.offset as u64),
        };
        let (rows, total) = job_repo::query(&self.db, &filter)?;
        Ok(JobPage {
            jobs: rows_to_jobs(rows)?,
            total: total as usize,
        })
    }

    fn load_config(&self) -> Result<Option<QueueConfig>, DatabaseError> {
        config_repo::load(&self.db)
    }

    fn save_config(&self, config: &QueueConfig) -> Result<(), DatabaseError> {
        config_repo::save(&self.db, config)
    }

    fn load_metrics_history(&self) -> Result<Vec<QueueMetrics>, DatabaseError> {
        metrics_repo::load_all(&self.db)
    }

    fn append_metrics(
        &self,
        snapshot: &QueueMetrics,
        max_len: usize,
    ) -> Result<(), DatabaseError> {
        metrics_repo::append(&self.db, snapshot, max_len)
    }
}
