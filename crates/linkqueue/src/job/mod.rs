//! Job records and the lifecycle state machine.

pub mod lifecycle;
pub mod model;

pub use lifecycle::{
    apply, Applied, Command, JobOperationError, ManageOutcome, ManageRequest, Operation,
};
pub use model::{
    Item, Job, JobInput, JobKind, JobOutput, JobPriority, JobProgress, JobStatus, JobStatusView,
    ResourceUsage,
};
