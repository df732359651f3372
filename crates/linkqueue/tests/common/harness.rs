//! Fake collaborators and helpers for driving a queue from tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};
use url::Url;

use linkqueue::config::QueueConfig;
use linkqueue::db::DatabaseError;
use linkqueue::enrich::ContentExtractor;
use linkqueue::pipeline::{AiAnalysis, ExtractedContent};
use linkqueue::store::JobPage;
use linkqueue::{
    ContentAnalyzer, EnrichError, Item, Job, JobEvent, JobEventKind, JobQuery, JobRepository,
    JobStatus, JobStatusView, LinkQueue, MemoryRepository, ProcessingSettings, QueueMetrics,
};

/// How long helpers wait before failing a test.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

fn page_for(url: &Url) -> ExtractedContent {
    let text = format!(
        "Notes on {} covering async rust queues and worker pools",
        url.path()
    );
    ExtractedContent {
        title: Some(format!("Page {}", url.path())),
        description: None,
        excerpt: text.clone(),
        word_count: text.split_whitespace().count(),
        text,
        reading_time_minutes: 1,
    }
}

/// Returns a page immediately for every URL.
#[derive(Default)]
pub struct StaticExtractor {
    calls: AtomicUsize,
}

impl StaticExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentExtractor for StaticExtractor {
    async fn extract(&self, url: &Url) -> Result<ExtractedContent, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(page_for(url))
    }
}

/// Blocks every extraction until the test releases a permit for it.
pub struct GatedExtractor {
    gate: Semaphore,
    started: AtomicUsize,
}

impl GatedExtractor {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        }
    }

    /// Lets `n` more extractions finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Extractions that have begun, finished or not.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentExtractor for GatedExtractor {
    async fn extract(&self, url: &Url) -> Result<ExtractedContent, EnrichError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?;
        permit.forget();
        Ok(page_for(url))
    }
}

/// Fails every extraction with an HTTP error.
#[derive(Default)]
pub struct FailingExtractor {
    calls: AtomicUsize,
}

impl FailingExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentExtractor for FailingExtractor {
    async fn extract(&self, _url: &Url) -> Result<ExtractedContent, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EnrichError::Http("connection refused".to_string()))
    }
}

/// Analyzer that is always down.
pub struct FailingAnalyzer;

#[async_trait]
impl ContentAnalyzer for FailingAnalyzer {
    async fn analyze(
        &self,
        _item: &Item,
        _content: Option<&ExtractedContent>,
        _settings: &ProcessingSettings,
    ) -> Result<AiAnalysis, EnrichError> {
        Err(EnrichError::Analysis("model unavailable".to_string()))
    }
}

/// Analyzer that panics, to exercise worker panic isolation.
pub struct PanickingAnalyzer;

#[async_trait]
impl ContentAnalyzer for PanickingAnalyzer {
    async fn analyze(
        &self,
        _item: &Item,
        _content: Option<&ExtractedContent>,
        _settings: &ProcessingSettings,
    ) -> Result<AiAnalysis, EnrichError> {
        panic!("analyzer exploded");
    }
}

/// In-memory repository that can stall progress writes and fail deletes.
#[derive(Default)]
pub struct FaultyRepository {
    inner: MemoryRepository,
    progress_write_delay: Option<Duration>,
    fail_deletes: AtomicBool,
}

impl FaultyRepository {
    /// Blocks for `delay` while writing a running job that has committed at
    /// least one item.
    pub fn slow_progress_writes(delay: Duration) -> Self {
        Self {
            progress_write_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl JobRepository for FaultyRepository {
    fn load_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
        self.inner.load_jobs()
    }

    fn save_jobs(&self, jobs: &[Job]) -> Result<(), DatabaseError> {
        self.inner.save_jobs(jobs)
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        self.inner.get_job(id)
    }

    fn upsert_job(&self, job: &Job) -> Result<(), DatabaseError> {
        if let Some(delay) = self.progress_write_delay {
            if job.status == JobStatus::Processing && job.progress.processed > 0 {
                std::thread::sleep(delay);
            }
        }
        self.inner.upsert_job(job)
    }

    fn delete_jobs(&self, ids: &[String]) -> Result<usize, DatabaseError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(DatabaseError::LockPoisoned);
        }
        self.inner.delete_jobs(ids)
    }

    fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, DatabaseError> {
        self.inner.list_jobs(query)
    }

    fn load_config(&self) -> Result<Option<QueueConfig>, DatabaseError> {
        self.inner.load_config()
    }

    fn save_config(&self, config: &QueueConfig) -> Result<(), DatabaseError> {
        self.inner.save_config(config)
    }

    fn load_metrics_history(&self) -> Result<Vec<QueueMetrics>, DatabaseError> {
        self.inner.load_metrics_history()
    }

    fn append_metrics(&self, snapshot: &QueueMetrics, max_len: usize) -> Result<(), DatabaseError> {
        self.inner.append_metrics(snapshot, max_len)
    }
}

/// Opens a queue over an in-memory repository with the given extractor.
pub async fn open_queue(config: QueueConfig, extractor: Arc<dyn ContentExtractor>) -> LinkQueue {
    LinkQueue::builder()
        .config(config)
        .extractor(extractor)
        .open()
        .await
        .expect("queue should open")
}

/// Opens a queue over `repository`.
pub async fn open_queue_with(
    repository: Arc<dyn JobRepository>,
    config: QueueConfig,
    extractor: Arc<dyn ContentExtractor>,
) -> LinkQueue {
    LinkQueue::builder()
        .config(config)
        .repository(repository)
        .extractor(extractor)
        .open()
        .await
        .expect("queue should open")
}

/// Polls `condition` until it holds, failing the test after [`WAIT_LIMIT`].
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Waits until `job_id` reaches `status` and returns its view.
pub async fn wait_for_status(queue: &LinkQueue, job_id: &str, status: JobStatus) -> JobStatusView {
    wait_until(&format!("job {} to become {}", job_id, status), || {
        queue
            .get_status(job_id)
            .map(|view| view.status == status)
            .unwrap_or(false)
    })
    .await;
    queue.get_status(job_id).expect("job should exist")
}

/// Receives events until one of `kind` arrives.
pub async fn next_event(rx: &mut broadcast::Receiver<JobEvent>, kind: JobEventKind) -> JobEvent {
    within(async {
        loop {
            match rx.recv().await {
                Ok(event) if event.kind == kind => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
}

/// Runs `fut`, failing the test after [`WAIT_LIMIT`].
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT_LIMIT, fut)
        .await
        .expect("operation should finish in time")
}
