//! Job records and the enums that describe them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProcessingSettings;
use crate::pipeline::result::{ItemStatus, ProcessingResult, ProcessingSummary};
use crate::pipeline::summary::summarize;

/// Status of a job in the lifecycle state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Terminal statuses admit no further transition, only deletion.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

/// Caller-assigned urgency. Ranking uses the configured weight, not the
/// declaration order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl JobPriority {
    pub const ALL: [JobPriority; 4] = [
        JobPriority::Low,
        JobPriority::Normal,
        JobPriority::High,
        JobPriority::Urgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Normal => "normal",
            JobPriority::High => "high",
            JobPriority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobPriority::ALL
            .into_iter()
            .find(|priority| priority.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown priority '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Single,
    Batch,
}

impl JobKind {
    pub fn for_item_count(count: usize) -> Self {
        if count == 1 {
            JobKind::Single
        } else {
            JobKind::Batch
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Single => "single",
            JobKind::Batch => "batch",
        }
    }
}

/// One URL to enrich. The optional fields are caller-supplied and used as
/// fallbacks when pipeline stages are disabled or fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Item {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
}

impl JobProgress {
    pub fn accounted(&self) -> usize {
        self.processed + self.failed
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.accounted())
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.accounted() as f64 * 100.0 / self.total as f64
    }
}

/// Work counters accumulated while a job runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub cpu_time_ms: u64,
    pub memory_peak_bytes: u64,
    pub api_calls: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub items: Vec<Item>,
    pub settings: ProcessingSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub results: Vec<ProcessingResult>,
    pub summary: ProcessingSummary,
}

/// A unit of work: one submission of one or more items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub owner_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set iff the job is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_start_time: Option<DateTime<Utc>>,
    /// Earliest start requested through `reschedule`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub progress: JobProgress,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub resource_usage: ResourceUsage,
    pub input: JobInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
}

impl Job {
    /// Creates a pending job. Callers validate the items beforehand.
    pub fn new(
        owner_id: &str,
        items: Vec<Item>,
        settings: ProcessingSettings,
        priority: JobPriority,
        now: DateTime<Utc>,
    ) -> Self {
        let total = items.len();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            kind: JobKind::for_item_count(total),
            status: JobStatus::Pending,
            priority,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            queue_position: None,
            estimated_start_time: None,
            scheduled_for: None,
            progress: JobProgress {
                total,
                ..Default::default()
            },
            retry_count: 0,
            last_error: None,
            worker_id: None,
            resource_usage: ResourceUsage::default(),
            input: JobInput { items, settings },
            output: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Index of the first item without a result. Resumed jobs continue here.
    pub fn next_item_index(&self) -> usize {
        self.output.as_ref().map_or(0, |o| o.results.len())
    }

    /// Appends an item result and advances the progress counters.
    pub fn record_result(&mut self, result: ProcessingResult, now: DateTime<Utc>) {
        match result.status {
            ItemStatus::Failed => self.progress.failed += 1,
            ItemStatus::Success | ItemStatus::Skipped => self.progress.processed += 1,
        }
        self.progress.current_item = None;
        self.output
            .get_or_insert_with(JobOutput::default)
            .results
            .push(result);
        self.updated_at = now;
    }

    /// Rebuilds the summary from every result recorded so far.
    pub fn refresh_summary(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.summary = summarize(&output.results);
        }
    }

    /// Moves the job into a terminal status and stamps `completed_at`.
    pub fn finish(&mut self, status: JobStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
        self.queue_position = None;
        self.estimated_start_time = None;
        self.progress.current_item = None;
    }

    /// Records unprocessed items as skipped so a terminal job accounts for
    /// every item, then rebuilds the summary.
    pub fn close_out(&mut self, reason: &str, now: DateTime<Utc>) {
        let start = self.next_item_index();
        let pending: Vec<ProcessingResult> = self.input.items[start.min(self.input.items.len())..]
            .iter()
            .enumerate()
            .map(|(offset, item)| ProcessingResult::skipped(start + offset, &item.url, reason, now))
            .collect();
        for result in pending {
            self.record_result(result, now);
        }
        if self.output.is_none() {
            self.output = Some(JobOutput::default());
        }
        self.refresh_summary();
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id.clone(),
            status: self.status,
            priority: self.priority,
            progress: self.progress.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            queue_position: self.queue_position,
            estimated_start_time: self.estimated_start_time,
            error: self.last_error.clone(),
        }
    }
}

/// Status, progress and timestamps of one job, as returned by `get_status`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub progress: JobProgress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
