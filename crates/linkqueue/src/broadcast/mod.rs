//! Broadcasting of job events for real-time streaming.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster, JobEventKind};
