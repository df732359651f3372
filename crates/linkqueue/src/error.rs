use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::job::{JobStatus, Operation};

#[derive(Error, Debug)]
pub enum LinkQueueError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Results unavailable: {0}")]
    Results(#[from] ResultsError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Collaborator setup failed: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Storage error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("'{field}' = {value} is out of range ({bounds})")]
    OutOfRange {
        field: String,
        value: String,
        bounds: String,
    },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Reasons a submission is refused before anything is enqueued.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("At least one item is required")]
    EmptyBatch,

    #[error("Batch has {count} items, the limit is {max}")]
    TooManyItems { count: usize, max: usize },

    #[error("Item {index} has an invalid URL '{url}': {reason}")]
    InvalidUrl {
        index: usize,
        url: String,
        reason: String,
    },

    #[error("Queue is full ({size} of {max} slots in use)")]
    QueueFull { size: usize, max: usize },

    #[error("Invalid processing settings: {0}")]
    InvalidSettings(#[source] ConfigError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {0} belongs to another user")]
    NotOwner(String),

    #[error("Cannot {operation} a job that is {status}")]
    InvalidTransition {
        operation: Operation,
        status: JobStatus,
    },

    #[error("A new priority is required to prioritize")]
    MissingPriority,

    #[error("A scheduled time is required to reschedule")]
    MissingScheduledTime,
}

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Job {job_id} is {status}, results are only available once completed")]
    NotCompleted { job_id: String, status: JobStatus },

    #[error("Job {0} completed without output")]
    NoOutput(String),
}

/// Failures of the pluggable enrichment collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrichError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Similarity lookup failed: {0}")]
    Lookup(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Job {0} disappeared while it was running")]
    JobLost(String),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),

    #[error("Job exceeded its {0}s time limit")]
    TimedOut(u64),
}

pub type Result<T> = std::result::Result<T, LinkQueueError>;
