//! Per-item enrichment pipeline.

pub mod processor;
pub mod result;
pub mod retry;
pub mod summary;

pub use processor::{parse_item_url, ItemContext, ItemProcessor, ProcessedItem};
pub use result::{
    AiAnalysis, DuplicateCheck, DuplicateOutcome, ExtractedContent, ItemStatus, ProcessingResult,
    ProcessingSummary,
};
pub use retry::{Attempted, RetryPolicy};
pub use summary::summarize;
