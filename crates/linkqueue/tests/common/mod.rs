//! Shared test utilities for linkqueue integration tests.
//!
//! This module provides:
//! - Fake collaborators (gated, failing and panicking stages)
//! - Helpers that open a queue and wait for job state changes
//! - Builders for configs and item batches

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
