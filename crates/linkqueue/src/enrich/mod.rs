//! Pluggable enrichment collaborators used by the item processor.

pub mod analyzer;
pub mod extractor;
pub mod similarity;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ProcessingSettings;
use crate::error::EnrichError;
use crate::job::Item;
use crate::pipeline::result::{AiAnalysis, ExtractedContent, SimilarLink};

pub use analyzer::KeywordAnalyzer;
pub use extractor::HttpExtractor;
pub use similarity::LinkIndex;

/// Fetches a page and pulls readable content out of it.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &Url) -> Result<ExtractedContent, EnrichError>;
}

/// Categorizes, tags and summarizes an item.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        item: &Item,
        content: Option<&ExtractedContent>,
        settings: &ProcessingSettings,
    ) -> Result<AiAnalysis, EnrichError>;
}

/// Looks up links resembling a new one in the existing collection.
#[async_trait]
pub trait SimilarityFinder: Send + Sync {
    async fn find_similar(
        &self,
        url: &Url,
        content: Option<&ExtractedContent>,
    ) -> Result<Vec<SimilarLink>, EnrichError>;

    /// Adds a successfully processed link to the collection.
    async fn register(&self, link: KnownLink) -> Result<(), EnrichError>;
}

/// A link already present in the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnownLink {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Truncates to at most `max` chars, never splitting a char.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 50), "short");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_chars("", 3), "");
    }
}
