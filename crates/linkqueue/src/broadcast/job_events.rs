//! Job lifecycle broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::{Job, JobProgress, JobStatus};

/// What happened to a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Submitted,
    Admitted,
    ItemProcessed,
    Paused,
    Resumed,
    Cancelled,
    Reprioritized,
    Rescheduled,
    Completed,
    Failed,
    Removed,
}

impl JobEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobEventKind::Submitted => "submitted",
            JobEventKind::Admitted => "admitted",
            JobEventKind::ItemProcessed => "item_processed",
            JobEventKind::Paused => "paused",
            JobEventKind::Resumed => "resumed",
            JobEventKind::Cancelled => "cancelled",
            JobEventKind::Reprioritized => "reprioritized",
            JobEventKind::Rescheduled => "rescheduled",
            JobEventKind::Completed => "completed",
            JobEventKind::Failed => "failed",
            JobEventKind::Removed => "removed",
        }
    }

    /// True for events after which the job never changes again.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            JobEventKind::Cancelled
                | JobEventKind::Completed
                | JobEventKind::Failed
                | JobEventKind::Removed
        )
    }
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event for a single job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub owner_id: String,
    pub kind: JobEventKind,
    /// Job status after the event.
    pub status: JobStatus,
    pub progress: JobProgress,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Builds an event from the job's state after the change.
    pub fn from_job(job: &Job, kind: JobEventKind, message: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            owner_id: job.owner_id.clone(),
            kind,
            status: job.status,
            progress: job.progress.clone(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts job events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Convenience for `send(JobEvent::from_job(..))`.
    pub fn emit(&self, job: &Job, kind: JobEventKind, message: impl Into<String>) {
        self.send(JobEvent::from_job(job, kind, message));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingSettings;
    use crate::job::{Item, JobPriority};

    fn job() -> Job {
        Job::new(
            "user-1",
            vec![Item::new("https://example.com")],
            ProcessingSettings::default(),
            JobPriority::Normal,
            Utc::now(),
        )
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = JobEventBroadcaster::new(4);
        broadcaster.emit(&job(), JobEventKind::Submitted, "queued");
        assert_eq!(broadcaster.receiver_count(), 0);
    }

    #[test]
    fn test_send_receive() {
        let broadcaster = JobEventBroadcaster::default();
        let mut rx = broadcaster.subscribe();
        let job = job();

        broadcaster.emit(&job, JobEventKind::Submitted, "queued");

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id, job.id);
        assert_eq!(received.owner_id, "user-1");
        assert_eq!(received.kind, JobEventKind::Submitted);
        assert_eq!(received.status, JobStatus::Pending);
        assert_eq!(received.progress.total, 1);
        assert_eq!(received.message, "queued");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&JobEventKind::ItemProcessed).unwrap();
        assert_eq!(json, "\"item_processed\"");
        assert!(JobEventKind::Removed.is_final());
        assert!(!JobEventKind::Paused.is_final());
    }
}
