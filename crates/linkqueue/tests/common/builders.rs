//! Builders for configs and item batches.

#![allow(dead_code)]

use linkqueue::config::{ProcessingLimits, QueueConfig};
use linkqueue::{Item, ProcessingSettings};

/// Builder for `QueueConfig` instances tuned for fast tests: no retries and
/// no retry delay.
pub struct ConfigBuilder {
    config: QueueConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig {
                processing_limits: ProcessingLimits {
                    retry_attempts: 0,
                    retry_delay_ms: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n;
        self
    }

    pub fn max_queue_size(mut self, n: usize) -> Self {
        self.config.max_queue_size = n;
        self
    }

    pub fn max_items_per_batch(mut self, n: usize) -> Self {
        self.config.processing_limits.max_items_per_batch = n;
        self
    }

    pub fn retries(mut self, attempts: u32) -> Self {
        self.config.processing_limits.retry_attempts = attempts;
        self
    }

    pub fn build(self) -> QueueConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` items on distinct hosts so duplicate detection stays quiet.
pub fn items(count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| Item::new(format!("https://site{}.example.com/articles/{}", i, i)))
        .collect()
}

pub fn single_item(url: &str) -> Vec<Item> {
    vec![Item::new(url)]
}

/// Settings with duplicate detection off.
pub fn no_duplicate_check() -> ProcessingSettings {
    ProcessingSettings {
        check_duplicates: false,
        ..Default::default()
    }
}
