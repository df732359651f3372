//! Worker pool capacity, resizing, panic isolation and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use linkqueue::{
    JobEventKind, JobStatus, LinkQueue, LinkQueueError, QueueConfigPatch, WorkerError,
};

use common::*;

#[tokio::test]
async fn test_running_jobs_never_exceed_capacity() {
    let extractor = Arc::new(GatedExtractor::new());
    let queue = open_queue(
        ConfigBuilder::new().max_concurrent_jobs(2).build(),
        extractor.clone(),
    )
    .await;
    queue.start().unwrap();
    let ids: Vec<_> = (0..5)
        .map(|_| {
            queue
                .submit("alice", items(1), Some(no_duplicate_check()), None)
                .unwrap()
        })
        .collect();

    wait_until("two running jobs", || extractor.started() == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(extractor.started(), 2);
    assert_eq!(queue.get_queue_status().occupancy, 2);

    extractor.release(5);
    for id in &ids {
        wait_for_status(&queue, id, JobStatus::Completed).await;
    }
    queue.shutdown().await;
}

#[tokio::test]
async fn test_growing_capacity_admits_waiting_jobs() {
    let extractor = Arc::new(GatedExtractor::new());
    let queue = open_queue(
        ConfigBuilder::new().max_concurrent_jobs(1).build(),
        extractor.clone(),
    )
    .await;
    queue.start().unwrap();
    for _ in 0..3 {
        queue
            .submit("alice", items(1), Some(no_duplicate_check()), None)
            .unwrap();
    }
    wait_until("one running job", || extractor.started() == 1).await;

    let patch = QueueConfigPatch {
        max_concurrent_jobs: Some(3),
        ..Default::default()
    };
    let updated = queue.update_config(&patch).unwrap();
    assert_eq!(updated.max_concurrent_jobs, 3);
    assert_eq!(queue.config().max_concurrent_jobs, 3);

    wait_until("three running jobs", || extractor.started() == 3).await;
    assert_eq!(queue.get_queue_status().available_slots, 0);

    extractor.release(3);
    queue.shutdown().await;
}

#[tokio::test]
async fn test_shrinking_capacity_takes_effect_as_jobs_finish() {
    let extractor = Arc::new(GatedExtractor::new());
    let queue = open_queue(
        ConfigBuilder::new().max_concurrent_jobs(2).build(),
        extractor.clone(),
    )
    .await;
    queue.start().unwrap();
    for _ in 0..4 {
        queue
            .submit("alice", items(1), Some(no_duplicate_check()), None)
            .unwrap();
    }
    wait_until("two running jobs", || extractor.started() == 2).await;

    let patch = QueueConfigPatch {
        max_concurrent_jobs: Some(1),
        ..Default::default()
    };
    queue.update_config(&patch).unwrap();
    assert_eq!(queue.get_queue_status().occupancy, 2, "running jobs keep their slots");

    extractor.release(2);
    wait_until("a third job", || extractor.started() == 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(extractor.started(), 3);
    assert_eq!(queue.get_queue_status().occupancy, 1);

    extractor.release(2);
    queue.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_update_is_rejected() {
    let queue = open_queue(
        ConfigBuilder::new().build(),
        Arc::new(StaticExtractor::default()),
    )
    .await;
    let patch = QueueConfigPatch {
        max_concurrent_jobs: Some(0),
        ..Default::default()
    };
    assert!(matches!(
        queue.update_config(&patch),
        Err(LinkQueueError::Config(_))
    ));
    assert_eq!(queue.config().max_concurrent_jobs, 3);
}

#[tokio::test]
async fn test_panicking_stage_fails_only_its_job() {
    let queue = LinkQueue::builder()
        .config(ConfigBuilder::new().build())
        .extractor(Arc::new(StaticExtractor::default()))
        .analyzer(Arc::new(PanickingAnalyzer))
        .open()
        .await
        .unwrap();
    let mut events = queue.subscribe();
    queue.start().unwrap();
    let job_id = queue.submit("alice", items(2), None, None).unwrap();

    let event = next_event(&mut events, JobEventKind::Failed).await;
    assert_eq!(event.job_id, job_id);

    let view = queue.get_status(&job_id).unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.unwrap().contains("analyzer exploded"));
    assert_eq!(view.progress.processed + view.progress.failed, 2);

    // The pool keeps serving other jobs.
    let settings = linkqueue::ProcessingSettings {
        analyze_content: false,
        ..Default::default()
    };
    let next = queue.submit("alice", items(1), Some(settings), None).unwrap();
    wait_for_status(&queue, &next, JobStatus::Completed).await;
    queue.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_returns_running_jobs_to_pending() {
    let extractor = Arc::new(GatedExtractor::new());
    let queue = open_queue(ConfigBuilder::new().build(), extractor.clone()).await;
    queue.start().unwrap();
    let job_id = queue
        .submit("alice", items(2), Some(no_duplicate_check()), None)
        .unwrap();
    wait_for_status(&queue, &job_id, JobStatus::Processing).await;
    wait_until("first extraction", || extractor.started() == 1).await;

    within(queue.shutdown()).await;

    let job = queue.get_job(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.worker_id.is_none());
    assert_eq!(job.next_item_index(), 0);
    assert!(matches!(
        queue.start(),
        Err(LinkQueueError::Worker(WorkerError::ShutDown))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_job_exceeding_time_limit_fails() {
    let extractor = Arc::new(GatedExtractor::new());
    let mut config = ConfigBuilder::new().build();
    config.processing_limits.batch_job_timeout_secs = 60;
    let queue = open_queue(config, extractor.clone()).await;
    let mut events = queue.subscribe();
    queue.start().unwrap();

    // Each gated extraction runs into the 30s stage timeout, so three items
    // outlast the 60s job limit.
    let job_id = queue
        .submit("alice", items(3), Some(no_duplicate_check()), None)
        .unwrap();
    let failed = tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            match events.recv().await {
                Ok(event) if event.kind == JobEventKind::Failed => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel error: {}", e),
            }
        }
    })
    .await
    .expect("job should hit its time limit");

    assert_eq!(failed.job_id, job_id);
    let view = queue.get_status(&job_id).unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.unwrap().contains("60s time limit"));
    assert_eq!(view.progress.processed + view.progress.failed, 3);
    queue.shutdown().await;
}
