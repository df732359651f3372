pub mod broadcast;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod job;
pub mod maintenance;
pub mod metrics;
pub mod pipeline;
pub mod sanitize;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
pub use config::{load_config, ProcessingSettings, QueueConfig, QueueConfigPatch};
pub use enrich::{ContentAnalyzer, ContentExtractor, KnownLink, SimilarityFinder};
pub use error::{
    ConfigError, EnrichError, LifecycleError, LinkQueueError, Result, ResultsError, SubmitError,
    WorkerError,
};
pub use job::{
    Item, Job, JobPriority, JobStatus, JobStatusView, ManageOutcome, ManageRequest, Operation,
};
pub use maintenance::{CleanupReport, CleanupType};
pub use metrics::QueueMetrics;
pub use service::{LinkQueue, LinkQueueBuilder, MetricsReport, QueueStatus};
pub use store::{JobQuery, JobRepository, MemoryRepository, SqliteRepository};
pub use telemetry::{init_tracing, LogFormat};
