//! Queue health metrics.

pub mod aggregator;
pub mod probe;
pub mod snapshot;

pub use aggregator::{MetricsAggregator, RECENT_SNAPSHOTS};
pub use probe::{JobUsageProbe, ResourceProbe};
pub use snapshot::{
    BottleneckFlags, PerformanceMetrics, PriorityDistribution, QueueMetrics, QueueStats,
    ResourceSnapshot,
};
