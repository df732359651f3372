//! Builds a [`ProcessingSummary`] from item results.

use super::result::{DuplicateOutcome, ItemStatus, ProcessingResult, ProcessingSummary, QualityTier};

pub fn summarize(results: &[ProcessingResult]) -> ProcessingSummary {
    let mut summary = ProcessingSummary {
        total: results.len(),
        ..Default::default()
    };

    for result in results {
        summary.total_time_ms += result.timing.total_ms;

        match result.status {
            ItemStatus::Success => summary.successful += 1,
            ItemStatus::Failed => summary.failed += 1,
            ItemStatus::Skipped => summary.skipped += 1,
        }

        if let Some(analysis) = &result.analysis {
            *summary
                .by_category
                .entry(analysis.category.label.clone())
                .or_default() += 1;
            for tag in &analysis.tags {
                *summary.by_tag.entry(tag.label.clone()).or_default() += 1;
            }
            *summary
                .by_language
                .entry(analysis.language.clone())
                .or_default() += 1;
            *summary
                .by_content_type
                .entry(analysis.content_type.clone())
                .or_default() += 1;
            match analysis.quality.tier() {
                QualityTier::High => summary.quality.high += 1,
                QualityTier::Medium => summary.quality.medium += 1,
                QualityTier::Low => summary.quality.low += 1,
            }
        }

        if let Some(check) = &result.duplicate_check {
            match check.outcome {
                DuplicateOutcome::Duplicate => summary.duplicates += 1,
                DuplicateOutcome::Similar => summary.similar += 1,
                DuplicateOutcome::Unique => {}
            }
        }
    }

    summary
}
