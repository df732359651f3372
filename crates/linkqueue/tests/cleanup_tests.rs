//! Retention cleanup through the queue facade.

mod common;

use std::sync::Arc;

use linkqueue::{
    CleanupType, ConfigError, JobEventKind, JobRepository, JobStatus, LinkQueueError,
    MemoryRepository,
};

use common::*;

#[tokio::test]
async fn test_cleanup_removes_terminal_jobs_everywhere() {
    let repository = Arc::new(MemoryRepository::new());
    let queue = open_queue_with(
        repository.clone(),
        ConfigBuilder::new().build(),
        Arc::new(StaticExtractor::default()),
    )
    .await;
    queue.start().unwrap();
    let done = queue.submit("alice", items(1), None, None).unwrap();
    wait_for_status(&queue, &done, JobStatus::Completed).await;
    queue.shutdown().await;

    let waiting = queue.submit("alice", items(1), None, None).unwrap();
    let mut events = queue.subscribe();

    let report = queue.cleanup(CleanupType::Completed, Some(0)).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.remaining, 1);

    let event = next_event(&mut events, JobEventKind::Removed).await;
    assert_eq!(event.job_id, done);
    assert!(queue.get_status(&done).is_err());
    assert!(repository.get_job(&done).unwrap().is_none());
    assert_eq!(
        queue.get_status(&waiting).unwrap().status,
        JobStatus::Pending
    );
}

#[tokio::test]
async fn test_default_retention_keeps_recent_jobs() {
    let queue = open_queue(
        ConfigBuilder::new().build(),
        Arc::new(StaticExtractor::default()),
    )
    .await;
    let job_id = queue.submit("alice", items(1), None, None).unwrap();
    queue.cancel("alice", &job_id).unwrap();

    let report = queue.cleanup(CleanupType::All, None).unwrap();
    assert_eq!(report.removed, 0);
    assert_eq!(report.remaining, 1);
}

#[tokio::test]
async fn test_cleanup_type_limits_statuses() {
    let queue = open_queue(
        ConfigBuilder::new().build(),
        Arc::new(StaticExtractor::default()),
    )
    .await;
    let cancelled = queue.submit("alice", items(1), None, None).unwrap();
    queue.cancel("alice", &cancelled).unwrap();
    let pending = queue.submit("alice", items(1), None, None).unwrap();

    let report = queue.cleanup(CleanupType::Failed, Some(0)).unwrap();
    assert_eq!(report.removed, 0);

    let report = queue.cleanup(CleanupType::Cancelled, Some(0)).unwrap();
    assert_eq!(report.removed, 1);
    assert!(queue.get_job(&cancelled).is_err());
    assert!(queue.get_job(&pending).is_ok());
}

#[tokio::test]
async fn test_cleanup_rejects_window_beyond_limit() {
    let queue = open_queue(
        ConfigBuilder::new().build(),
        Arc::new(StaticExtractor::default()),
    )
    .await;
    let job_id = queue.submit("alice", items(1), None, None).unwrap();
    queue.cancel("alice", &job_id).unwrap();

    assert!(matches!(
        queue.cleanup(CleanupType::All, Some(u32::MAX)),
        Err(LinkQueueError::Config(ConfigError::OutOfRange { .. }))
    ));
    assert!(queue.get_job(&job_id).is_ok());

    let report = queue.cleanup(CleanupType::Cancelled, Some(3650)).unwrap();
    assert_eq!(report.removed, 0);
    let report = queue.cleanup(CleanupType::Cancelled, Some(0)).unwrap();
    assert_eq!(report.removed, 1);
}

#[tokio::test]
async fn test_failed_delete_leaves_jobs_in_place() {
    let repository = Arc::new(FaultyRepository::default());
    let queue = open_queue_with(
        repository.clone(),
        ConfigBuilder::new().build(),
        Arc::new(StaticExtractor::default()),
    )
    .await;
    let job_id = queue.submit("alice", items(1), None, None).unwrap();
    queue.cancel("alice", &job_id).unwrap();

    repository.fail_deletes(true);
    assert!(matches!(
        queue.cleanup(CleanupType::Cancelled, Some(0)),
        Err(LinkQueueError::Database(_))
    ));
    assert_eq!(
        queue.get_status(&job_id).unwrap().status,
        JobStatus::Cancelled
    );
    assert!(repository.get_job(&job_id).unwrap().is_some());

    repository.fail_deletes(false);
    let report = queue.cleanup(CleanupType::Cancelled, Some(0)).unwrap();
    assert_eq!(report.removed, 1);
    assert!(repository.get_job(&job_id).unwrap().is_none());
}
