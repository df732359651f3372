//! Job state machine.
//!
//! Every externally triggered transition goes through [`apply`], which checks
//! the transition table and mutates the job in place. The caller holds the
//! job's lock for the whole check-and-apply.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Job, JobPriority, JobStatus};
use crate::error::LifecycleError;

/// Lifecycle operations a caller can request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Pause,
    Resume,
    Cancel,
    Prioritize,
    Reschedule,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Cancel => "cancel",
            Operation::Prioritize => "prioritize",
            Operation::Reschedule => "reschedule",
        }
    }

    /// Statuses this operation may be applied from.
    pub fn valid_from(self) -> &'static [JobStatus] {
        match self {
            Operation::Pause => &[JobStatus::Pending, JobStatus::Processing],
            Operation::Resume => &[JobStatus::Paused],
            Operation::Cancel => &[
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Paused,
            ],
            Operation::Prioritize | Operation::Reschedule => &[JobStatus::Pending],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation with its argument resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Cancel,
    Prioritize(JobPriority),
    Reschedule(DateTime<Utc>),
}

impl Command {
    pub fn operation(&self) -> Operation {
        match self {
            Command::Pause => Operation::Pause,
            Command::Resume => Operation::Resume,
            Command::Cancel => Operation::Cancel,
            Command::Prioritize(_) => Operation::Prioritize,
            Command::Reschedule(_) => Operation::Reschedule,
        }
    }
}

/// A batch lifecycle request, as received by `manage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManageRequest {
    pub operation: Operation,
    pub job_ids: Vec<String>,
    #[serde(default)]
    pub new_priority: Option<JobPriority>,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl ManageRequest {
    pub fn new(operation: Operation, job_ids: Vec<String>) -> Self {
        Self {
            operation,
            job_ids,
            new_priority: None,
            scheduled_time: None,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.new_priority = Some(priority);
        self
    }

    pub fn with_scheduled_time(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_time = Some(at);
        self
    }

    /// Resolves the operation's required argument.
    pub fn command(&self) -> Result<Command, LifecycleError> {
        Ok(match self.operation {
            Operation::Pause => Command::Pause,
            Operation::Resume => Command::Resume,
            Operation::Cancel => Command::Cancel,
            Operation::Prioritize => {
                Command::Prioritize(self.new_priority.ok_or(LifecycleError::MissingPriority)?)
            }
            Operation::Reschedule => Command::Reschedule(
                self.scheduled_time
                    .ok_or(LifecycleError::MissingScheduledTime)?,
            ),
        })
    }
}

/// A failure for one job id in a batch request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobOperationError {
    pub job_id: String,
    pub message: String,
}

/// Per-job outcomes of a batch request.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManageOutcome {
    pub succeeded: Vec<String>,
    pub errors: Vec<JobOperationError>,
}

impl ManageOutcome {
    pub fn push_error(&mut self, job_id: &str, error: &LifecycleError) {
        self.errors.push(JobOperationError {
            job_id: job_id.to_string(),
            message: error.to_string(),
        });
    }

    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// What a successful transition changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub previous: JobStatus,
    pub current: JobStatus,
    /// Worker that was running the job and must be told to stop.
    pub interrupted_worker: Option<String>,
}

/// Checks ownership and the transition table, then applies `command`.
pub fn apply(
    job: &mut Job,
    owner_id: &str,
    command: Command,
    now: DateTime<Utc>,
) -> Result<Applied, LifecycleError> {
    if job.owner_id != owner_id {
        return Err(LifecycleError::NotOwner(job.id.clone()));
    }

    let operation = command.operation();
    let previous = job.status;
    if !operation.valid_from().contains(&previous) {
        return Err(LifecycleError::InvalidTransition {
            operation,
            status: previous,
        });
    }

    let interrupted_worker = match (previous, command) {
        (JobStatus::Processing, Command::Pause | Command::Cancel) => job.worker_id.take(),
        _ => None,
    };

    match command {
        Command::Pause => {
            job.status = JobStatus::Paused;
            job.queue_position = None;
            job.estimated_start_time = None;
            job.progress.current_item = None;
        }
        Command::Resume => {
            job.status = JobStatus::Pending;
        }
        Command::Cancel => {
            job.close_out("job cancelled", now);
            job.finish(JobStatus::Cancelled, now);
        }
        Command::Prioritize(priority) => {
            job.priority = priority;
        }
        Command::Reschedule(at) => {
            job.scheduled_for = Some(at);
        }
    }
    job.updated_at = now;

    Ok(Applied {
        previous,
        current: job.status,
        interrupted_worker,
    })
}
