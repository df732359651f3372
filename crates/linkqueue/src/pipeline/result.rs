//! Per-item outcomes and the job-level summary built from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed,
    Skipped,
}

/// Text pulled from the linked page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    /// Full page text. Dropped before the result is stored.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    pub word_count: usize,
    pub reading_time_minutes: u32,
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.text.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoredLabel {
    pub label: String,
    pub confidence: f32,
}

impl ScoredLabel {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityScore {
    pub overall: f32,
    pub readability: f32,
    pub depth: f32,
    pub credibility: f32,
}

impl QualityScore {
    pub fn tier(&self) -> QualityTier {
        if self.overall >= 0.7 {
            QualityTier::High
        } else if self.overall >= 0.4 {
            QualityTier::Medium
        } else {
            QualityTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Keywords {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
}

/// Categorization, tagging and summary of one item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    pub category: ScoredLabel,
    pub tags: Vec<ScoredLabel>,
    pub summary: String,
    pub language: String,
    pub quality: QualityScore,
    pub sentiment: Sentiment,
    pub keywords: Keywords,
    pub content_type: String,
    /// Built from caller metadata because the analyzer was unavailable.
    #[serde(default)]
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateOutcome {
    Unique,
    Similar,
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimilarLink {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheck {
    pub outcome: DuplicateOutcome,
    pub best_score: f32,
    pub matches: Vec<SimilarLink>,
}

impl DuplicateCheck {
    pub const DUPLICATE_THRESHOLD: f32 = 0.9;
    pub const SIMILAR_THRESHOLD: f32 = 0.7;

    /// Classifies candidate matches. Candidates at or below the similar
    /// threshold are dropped.
    pub fn from_matches(mut matches: Vec<SimilarLink>) -> Self {
        matches.retain(|m| m.similarity > Self::SIMILAR_THRESHOLD);
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        let best_score = matches.first().map_or(0.0, |m| m.similarity);
        let outcome = if best_score > Self::DUPLICATE_THRESHOLD {
            DuplicateOutcome::Duplicate
        } else if best_score > Self::SIMILAR_THRESHOLD {
            DuplicateOutcome::Similar
        } else {
            DuplicateOutcome::Unique
        };
        Self {
            outcome,
            best_score,
            matches,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemTiming {
    pub started_at: DateTime<Utc>,
    pub extraction_ms: u64,
    pub analysis_ms: u64,
    pub duplicate_check_ms: u64,
    pub total_ms: u64,
}

impl ItemTiming {
    pub fn starting_at(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            extraction_ms: 0,
            analysis_ms: 0,
            duplicate_check_ms: 0,
            total_ms: 0,
        }
    }
}

/// Number of calls made per stage, retries included.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageAttempts {
    pub extraction: u32,
    pub analysis: u32,
    pub duplicate_check: u32,
}

impl StageAttempts {
    pub fn total(&self) -> u32 {
        self.extraction + self.analysis + self.duplicate_check
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub index: usize,
    pub url: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ExtractedContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AiAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_check: Option<DuplicateCheck>,
    pub timing: ItemTiming,
    #[serde(default)]
    pub attempts: StageAttempts,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingResult {
    pub fn new(index: usize, url: &str, status: ItemStatus, started_at: DateTime<Utc>) -> Self {
        Self {
            index,
            url: url.to_string(),
            status,
            content: None,
            analysis: None,
            duplicate_check: None,
            timing: ItemTiming::starting_at(started_at),
            attempts: StageAttempts::default(),
            warnings: Vec::new(),
            error: None,
        }
    }

    /// A result for an item that was never run.
    pub fn skipped(index: usize, url: &str, reason: &str, now: DateTime<Utc>) -> Self {
        let mut result = Self::new(index, url, ItemStatus::Skipped, now);
        result.warnings.push(format!("Skipped: {}", reason));
        result
    }

    pub fn failed(index: usize, url: &str, error: String, now: DateTime<Utc>) -> Self {
        let mut result = Self::new(index, url, ItemStatus::Failed, now);
        result.error = Some(error);
        result
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QualityHistogram {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Aggregate over every result of a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_tag: BTreeMap<String, usize>,
    pub by_language: BTreeMap<String, usize>,
    pub by_content_type: BTreeMap<String, usize>,
    pub quality: QualityHistogram,
    pub duplicates: usize,
    pub similar: usize,
    pub total_time_ms: u64,
}
