//! Live view of every job, one lock per job.
//!
//! The outer map lock is held only long enough to find or insert an entry;
//! all mutation happens under the job's own mutex. Listings are snapshots
//! assembled from individually locked reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::job::Job;
use crate::metrics::QueueStats;

type Entry = Arc<Mutex<Job>>;

#[derive(Default)]
pub struct JobTable {
    jobs: RwLock<HashMap<String, Entry>>,
}

fn lock_job(entry: &Entry) -> MutexGuard<'_, Job> {
    match entry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let table = Self::new();
        for job in jobs {
            table.insert(job);
        }
        table
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn entry(&self, id: &str) -> Option<Entry> {
        self.read().get(id).cloned()
    }

    /// Inserts or replaces a job.
    pub fn insert(&self, job: Job) {
        self.write()
            .insert(job.id.clone(), Arc::new(Mutex::new(job)));
    }

    /// Inserts `job` only if `admit` accepts it given the current counts.
    /// The table stays write-locked from the count to the insert.
    pub fn insert_if<E>(
        &self,
        job: Job,
        admit: impl FnOnce(&QueueStats, &Job) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut map = self.write();
        admit(&count_entries(map.values()), &job)?;
        map.insert(job.id.clone(), Arc::new(Mutex::new(job)));
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a clone of the job.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.entry(id).map(|e| lock_job(&e).clone())
    }

    /// Runs `f` with the job locked. `None` if the id is unknown.
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut Job) -> T) -> Option<T> {
        let entry = self.entry(id)?;
        let mut job = lock_job(&entry);
        Some(f(&mut job))
    }

    /// Runs `f` on every job, one lock at a time.
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut Job)) {
        let entries: Vec<Entry> = self.read().values().cloned().collect();
        for entry in entries {
            f(&mut lock_job(&entry));
        }
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.snapshot_where(|_| true)
    }

    pub fn snapshot_where(&self, mut predicate: impl FnMut(&Job) -> bool) -> Vec<Job> {
        let entries: Vec<Entry> = self.read().values().cloned().collect();
        entries
            .iter()
            .filter_map(|entry| {
                let job = lock_job(entry);
                predicate(&job).then(|| job.clone())
            })
            .collect()
    }

    /// Removes the listed jobs and returns those that were present.
    pub fn remove_ids(&self, ids: &[String]) -> Vec<Job> {
        let mut map = self.write();
        ids.iter()
            .filter_map(|id| map.remove(id))
            .map(|entry| lock_job(&entry).clone())
            .collect()
    }

    pub fn counts(&self) -> QueueStats {
        let entries: Vec<Entry> = self.read().values().cloned().collect();
        count_entries(entries.iter())
    }
}

fn count_entries<'a>(entries: impl Iterator<Item = &'a Entry>) -> QueueStats {
    let mut stats = QueueStats::default();
    for entry in entries {
        stats.add(lock_job(entry).status);
    }
    stats
}
