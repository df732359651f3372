//! In-process repository for tests and ephemeral runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{JobPage, JobQuery, JobRepository};
use crate::config::QueueConfig;
use crate::db::DatabaseError;
use crate::job::Job;
use crate::metrics::QueueMetrics;

#[derive(Default)]
struct State {
    jobs: HashMap<String, Job>,
    config: Option<QueueConfig>,
    metrics: VecDeque<QueueMetrics>,
}

#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory repository lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory repository lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl JobRepository for MemoryRepository {
    fn load_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
        let mut jobs: Vec<Job> = self.read().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn save_jobs(&self, jobs: &[Job]) -> Result<(), DatabaseError> {
        self.write().jobs = jobs.iter().map(|j| (j.id.clone(), j.clone())).collect();
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        Ok(self.read().jobs.get(id).cloned())
    }

    fn upsert_job(&self, job: &Job) -> Result<(), DatabaseError> {
        self.write().jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn delete_jobs(&self, ids: &[String]) -> Result<usize, DatabaseError> {
        let mut state = self.write();
        Ok(ids.iter().filter(|id| state.jobs.remove(*id).is_some()).count())
    }

    fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, DatabaseError> {
        let jobs: Vec<Job> = self.read().jobs.values().cloned().collect();
        Ok(query.apply(jobs))
    }

    fn load_config(&self) -> Result<Option<QueueConfig>, DatabaseError> {
        Ok(self.read().config.clone())
    }

    fn save_config(&self, config: &QueueConfig) -> Result<(), DatabaseError> {
        self.write().config = Some(config.clone());
        Ok(())
    }

    fn load_metrics_history(&self) -> Result<Vec<QueueMetrics>, DatabaseError> {
        Ok(self.read().metrics.iter().cloned().collect())
    }

    fn append_metrics(
        &self,
        snapshot: &QueueMetrics,
        max_len: usize,
    ) -> Result<(), DatabaseError> {
        let mut state = self.write();
        state.metrics.push_back(snapshot.clone());
        while state.metrics.len() > max_len {
            state.metrics.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::config::ProcessingSettings;
    use crate::job::{Item, JobPriority, JobStatus};

    fn job(owner: &str, priority: JobPriority, minutes_ago: i64) -> Job {
        Job::new(
            owner,
            vec![Item::new("https://example.com")],
            ProcessingSettings::default(),
            priority,
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn test_list_filters_and_paginates() {
        let repo = MemoryRepository::new();
        let a = job("alice", JobPriority::High, 3);
        let b = job("alice", JobPriority::Low, 2);
        let c = job("alice", JobPriority::High, 1);
        let d = job("bob", JobPriority::High, 0);
        repo.save_jobs(&[a.clone(), b, c.clone(), d]).unwrap();

        let mut query = JobQuery::for_owner("alice");
        query.priority = Some(JobPriority::High);
        let page = repo.list_jobs(&query).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.jobs[0].id, c.id);
        assert_eq!(page.jobs[1].id, a.id);

        query.limit = Some(1);
        query.offset = 1;
        let page = repo.list_jobs(&query).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].id, a.id);
    }

    #[test]
    fn test_delete_counts_only_existing() {
        let repo = MemoryRepository::new();
        let mut j = job("alice", JobPriority::Normal, 0);
        j.status = JobStatus::Completed;
        repo.upsert_job(&j).unwrap();

        assert_eq!(repo.delete_jobs(&[j.id.clone(), "nope".into()]).unwrap(), 1);
        assert!(repo.get_job(&j.id).unwrap().is_none());
    }
}
