use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::executor::{run_job, JobRun};
use super::WorkerContext;
use crate::broadcast::JobEventKind;
use crate::error::WorkerError;
use crate::job::{Job, JobStatus};
use crate::scheduler::rank_pending;

/// Dispatcher wake-up interval when nothing signals it. Catches jobs whose
/// `scheduled_for` has passed.
const DISPATCH_TICK: Duration = Duration::from_millis(500);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

struct ActiveJob {
    worker_id: String,
    cancel: CancellationToken,
}

type ActiveMap = Arc<Mutex<HashMap<String, ActiveJob>>>;

fn lock_active(active: &ActiveMap) -> MutexGuard<'_, HashMap<String, ActiveJob>> {
    match active.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Active worker map lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Runs at most `capacity` jobs at once, each on its own task.
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    semaphore: Arc<Semaphore>,
    capacity: AtomicUsize,
    active: ActiveMap,
    notify: Arc<Notify>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    next_worker: AtomicU64,
}

impl WorkerPool {
    pub fn new(ctx: Arc<WorkerContext>, capacity: usize) -> Self {
        Self {
            ctx,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity: AtomicUsize::new(capacity),
            active: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            dispatcher: Mutex::new(None),
            next_worker: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Jobs currently held by a worker, including ones winding down.
    pub fn active_count(&self) -> usize {
        lock_active(&self.active).len()
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        lock_active(&self.active).contains_key(job_id)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Spawns the dispatcher loop. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ShutDown);
        }
        let mut dispatcher = match self.dispatcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if dispatcher.is_some() {
            return Ok(());
        }

        let pool = Arc::clone(self);
        *dispatcher = Some(tokio::spawn(async move { pool.dispatch_loop().await }));
        info!("Started worker pool with {} slots", self.capacity());
        Ok(())
    }

    /// Wakes the dispatcher to look for admissible work.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Asks the worker holding `job_id` to stop at the next item boundary.
    pub fn interrupt(&self, job_id: &str) -> bool {
        match lock_active(&self.active).get(job_id) {
            Some(active) => {
                debug!(job_id, worker_id = %active.worker_id, "Interrupting worker");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Grows or shrinks the slot count. Running jobs keep their slots; a
    /// shrink takes effect as they finish.
    pub fn resize(&self, capacity: usize) {
        let previous = self.capacity.swap(capacity, Ordering::SeqCst);
        if capacity > previous {
            self.semaphore.add_permits(capacity - previous);
            self.wake();
        } else if capacity < previous {
            let surplus = (previous - capacity) as u32;
            match Arc::clone(&self.semaphore).try_acquire_many_owned(surplus) {
                Ok(permits) => permits.forget(),
                Err(_) => {
                    let semaphore = Arc::clone(&self.semaphore);
                    tokio::spawn(async move {
                        if let Ok(permits) = semaphore.acquire_many_owned(surplus).await {
                            permits.forget();
                        }
                    });
                }
            }
        }
        info!("Worker pool resized from {} to {} slots", previous, capacity);
    }

    /// Stops admission, interrupts running jobs and waits for their workers
    /// to finish, up to a grace period.
    pub async fn shutdown(&self) {
        info!("Shutting down worker pool...");
        // Worker tokens are children of this one.
        self.shutdown.cancel();

        let handle = match self.dispatcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Dispatcher task ended abnormally: {}", e);
            }
        }

        let permits = self.capacity() as u32;
        if tokio::time::timeout(SHUTDOWN_GRACE, self.semaphore.acquire_many(permits))
            .await
            .is_err()
        {
            warn!(
                "{} workers still running after {:?}",
                self.active_count(),
                SHUTDOWN_GRACE
            );
        }
        info!("Worker pool stopped");
    }

    async fn dispatch_loop(self: Arc<Self>) {
        debug!("Dispatcher started");
        loop {
            self.dispatch_ready();
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(DISPATCH_TICK) => {}
            }
        }
        debug!("Dispatcher stopped");
    }

    /// Admits pending jobs while slots are free.
    fn dispatch_ready(self: &Arc<Self>) {
        while !self.is_shutdown() {
            let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    trace!("All worker slots occupied");
                    return;
                }
            };
            let Some(job) = self.admit_next(Utc::now()) else {
                drop(permit);
                return;
            };
            self.spawn_worker(job, permit);
        }
    }

    /// Highest-ranked pending job that is due and has no worker winding down.
    fn next_candidate(&self, now: DateTime<Utc>) -> Option<String> {
        let jobs = self.ctx.table.snapshot_where(|j| j.status == JobStatus::Pending);
        let weights = self.ctx.config.get().priority_weights;
        let active = lock_active(&self.active);
        rank_pending(&jobs, &weights)
            .into_iter()
            .find(|job| {
                !active.contains_key(&job.id) && job.scheduled_for.map_or(true, |at| at <= now)
            })
            .map(|job| job.id.clone())
    }

    fn admit_next(&self, now: DateTime<Utc>) -> Option<(Job, ActiveJob)> {
        loop {
            let job_id = self.next_candidate(now)?;
            let worker_id = format!("worker-{}", self.next_worker.fetch_add(1, Ordering::SeqCst));

            let admitted = self.ctx.update_persisted(&job_id, |job| {
                if job.status != JobStatus::Pending {
                    return None;
                }
                job.status = JobStatus::Processing;
                job.started_at.get_or_insert(now);
                job.worker_id = Some(worker_id.clone());
                job.queue_position = None;
                job.estimated_start_time = None;
                job.updated_at = now;
                Some(job.clone())
            });

            // Lost a race with a lifecycle change; look again.
            let Some(Some(job)) = admitted else {
                continue;
            };

            let active = ActiveJob {
                worker_id,
                cancel: self.shutdown.child_token(),
            };
            return Some((job, active));
        }
    }

    fn spawn_worker(self: &Arc<Self>, (job, active): (Job, ActiveJob), permit: OwnedSemaphorePermit) {
        let job_id = job.id.clone();
        let worker_id = active.worker_id.clone();
        let cancel = active.cancel.clone();
        lock_active(&self.active).insert(job_id.clone(), active);

        info!(job_id = %job_id, worker_id = %worker_id, "Job admitted");
        self.ctx
            .events
            .emit(&job, JobEventKind::Admitted, format!("Started by {}", worker_id));
        self.ctx.reschedule();

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = run_job(&pool.ctx, &job_id, &worker_id, cancel).await;
            if let JobRun::Failed(error) = &outcome {
                debug!(job_id = %job_id, "Worker finished with failure: {}", error);
            }
            lock_active(&pool.active).remove(&job_id);
            pool.ctx.reschedule();
            pool.wake();
        });
    }
}
