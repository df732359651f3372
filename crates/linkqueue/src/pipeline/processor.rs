use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

use crate::config::ProcessingSettings;
use crate::enrich::{truncate_chars, ContentAnalyzer, ContentExtractor, KnownLink, SimilarityFinder};
use crate::error::EnrichError;
use crate::job::Item;
use crate::sanitize;

use super::result::{AiAnalysis, DuplicateCheck, ExtractedContent, ItemStatus, ProcessingResult};
use super::retry::RetryPolicy;

/// Parses an item URL, accepting only absolute http(s) URLs with a host.
pub fn parse_item_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_string());
    }
    Ok(url)
}

/// Per-job inputs shared by every item of the job.
pub struct ItemContext<'a> {
    pub job_id: &'a str,
    pub settings: &'a ProcessingSettings,
    pub retry: RetryPolicy,
    pub cancel: &'a CancellationToken,
}

/// An item result plus what it cost to produce.
#[derive(Debug)]
pub struct ProcessedItem {
    pub result: ProcessingResult,
    /// Bytes of page text held while the item ran.
    pub text_bytes: u64,
}

/// Runs one item through extraction, analysis and duplicate detection.
pub struct ItemProcessor {
    extractor: Arc<dyn ContentExtractor>,
    analyzer: Arc<dyn ContentAnalyzer>,
    similarity: Arc<dyn SimilarityFinder>,
}

impl ItemProcessor {
    pub fn new(
        extractor: Arc<dyn ContentExtractor>,
        analyzer: Arc<dyn ContentAnalyzer>,
        similarity: Arc<dyn SimilarityFinder>,
    ) -> Self {
        Self {
            extractor,
            analyzer,
            similarity,
        }
    }

    /// Processes `item`. Stage failures become warnings or fallbacks; only an
    /// unusable URL fails the item.
    pub async fn process(&self, ctx: &ItemContext<'_>, index: usize, item: &Item) -> ProcessedItem {
        let started_at = Utc::now();
        let clock = Instant::now();

        let url = match parse_item_url(&item.url) {
            Ok(url) => url,
            Err(reason) => {
                warn!(job_id = %ctx.job_id, index, "Item URL is invalid: {}", reason);
                let mut result = ProcessingResult::failed(
                    index,
                    &item.url,
                    format!("Invalid URL: {}", reason),
                    started_at,
                );
                result.timing.total_ms = elapsed_ms(clock);
                return ProcessedItem {
                    result,
                    text_bytes: 0,
                };
            }
        };

        let span = info_span!("item",
            job_id = %ctx.job_id,
            index,
            url = %sanitize::redact_url(&url),
        );
        self.run_stages(ctx, index, item, url, started_at, clock)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        ctx: &ItemContext<'_>,
        index: usize,
        item: &Item,
        url: Url,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
    ) -> ProcessedItem {
        let settings = ctx.settings;

        if let Some(host) = url.host_str().filter(|h| settings.is_excluded(h)) {
            debug!("Skipping excluded domain");
            let reason = format!("domain {} is excluded", host);
            let mut result = ProcessingResult::skipped(index, &item.url, &reason, started_at);
            result.timing.total_ms = elapsed_ms(clock);
            return ProcessedItem {
                result,
                text_bytes: 0,
            };
        }

        let mut result = ProcessingResult::new(index, &item.url, ItemStatus::Success, started_at);

        // Step 1: Extract content
        if settings.extract_content {
            self.step_extract(ctx, &url, &mut result)
                .instrument(info_span!("extract"))
                .await;
        }
        let text_bytes = result.content.as_ref().map_or(0, |c| c.text.len() as u64);

        // Step 2: Analyze
        if settings.analyze_content && !ctx.cancel.is_cancelled() {
            self.step_analyze(ctx, item, &mut result)
                .instrument(info_span!("analyze"))
                .await;
        }

        // Step 3: Check duplicates
        if settings.check_duplicates && !ctx.cancel.is_cancelled() {
            self.step_check_duplicates(ctx, &url, &mut result)
                .instrument(info_span!("check_duplicates"))
                .await;
        }

        // Results of a stopped job are discarded by the worker.
        if !ctx.cancel.is_cancelled() {
            self.register(ctx, &url, &result).await;
        }

        if let Some(content) = result.content.as_mut() {
            content.text.clear();
        }
        result.timing.total_ms = elapsed_ms(clock);
        debug!(
            warnings = result.warnings.len(),
            total_ms = result.timing.total_ms,
            "Item processed"
        );

        ProcessedItem { result, text_bytes }
    }

    async fn step_extract(&self, ctx: &ItemContext<'_>, url: &Url, result: &mut ProcessingResult) {
        let clock = Instant::now();
        let extractor = &self.extractor;
        let attempted = ctx.retry.run(ctx.cancel, || extractor.extract(url)).await;
        result.attempts.extraction = attempted.attempts;
        result.timing.extraction_ms = elapsed_ms(clock);

        match attempted.outcome {
            Ok(content) => result.content = Some(content),
            Err(e) => {
                warn!("Content extraction failed: {}", e);
                result.content = Some(ExtractedContent::default());
                result.warnings.push(stage_warning("Content extraction", &e));
            }
        }
    }

    async fn step_analyze(&self, ctx: &ItemContext<'_>, item: &Item, result: &mut ProcessingResult) {
        let clock = Instant::now();
        let analyzer = &self.analyzer;
        let settings = ctx.settings;
        let content = result.content.as_ref().filter(|c| !c.is_empty());
        let attempted = ctx
            .retry
            .run(ctx.cancel, || analyzer.analyze(item, content, settings))
            .await;

        let analysis = match attempted.outcome {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Analysis failed, using fallback: {}", e);
                let fallback = AiAnalysis::fallback(item, content, settings);
                result.warnings.push(stage_warning("AI analysis", &e));
                fallback
            }
        };
        result.attempts.analysis = attempted.attempts;
        result.analysis = Some(refine_analysis(analysis, settings));
        result.timing.analysis_ms = elapsed_ms(clock);
    }

    async fn step_check_duplicates(
        &self,
        ctx: &ItemContext<'_>,
        url: &Url,
        result: &mut ProcessingResult,
    ) {
        let clock = Instant::now();
        let similarity = &self.similarity;
        let content = result.content.as_ref();
        let attempted = ctx
            .retry
            .run(ctx.cancel, || similarity.find_similar(url, content))
            .await;
        result.attempts.duplicate_check = attempted.attempts;
        result.timing.duplicate_check_ms = elapsed_ms(clock);

        match attempted.outcome {
            Ok(matches) => result.duplicate_check = Some(DuplicateCheck::from_matches(matches)),
            Err(e) => {
                warn!("Duplicate check failed: {}", e);
                result.warnings.push(stage_warning("Duplicate check", &e));
            }
        }
    }

    async fn register(&self, ctx: &ItemContext<'_>, url: &Url, result: &ProcessingResult) {
        let title = result
            .content
            .as_ref()
            .and_then(|c| c.title.clone());
        let link = KnownLink {
            id: format!("{}:{}", ctx.job_id, result.index),
            url: url.to_string(),
            title,
        };
        if let Err(e) = self.similarity.register(link).await {
            warn!("Failed to register link: {}", e);
        }
    }
}

/// Drops tags under the confidence threshold, caps the tag count and
/// shortens the summary.
pub fn refine_analysis(mut analysis: AiAnalysis, settings: &ProcessingSettings) -> AiAnalysis {
    analysis
        .tags
        .retain(|t| t.confidence >= settings.confidence_threshold);
    analysis
        .tags
        .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    analysis.tags.truncate(settings.max_tags);
    analysis.summary = truncate_chars(&analysis.summary, settings.max_summary_length);
    analysis
}

fn stage_warning(stage: &str, error: &EnrichError) -> String {
    format!("{} failed: {}", stage, error)
}

fn elapsed_ms(clock: Instant) -> u64 {
    clock.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{KeywordAnalyzer, LinkIndex};
    use crate::pipeline::result::{DuplicateOutcome, ScoredLabel};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticExtractor(Result<ExtractedContent, EnrichError>);

    #[async_trait]
    impl ContentExtractor for StaticExtractor {
        async fn extract(&self, _url: &Url) -> Result<ExtractedContent, EnrichError> {
            self.0.clone()
        }
    }

    struct BrokenAnalyzer;

    #[async_trait]
    impl ContentAnalyzer for BrokenAnalyzer {
        async fn analyze(
            &self,
            _item: &Item,
            _content: Option<&ExtractedContent>,
            _settings: &ProcessingSettings,
        ) -> Result<AiAnalysis, EnrichError> {
            Err(EnrichError::Analysis("model offline".into()))
        }
    }

    fn page() -> ExtractedContent {
        ExtractedContent {
            title: Some("Understanding Rust ownership".into()),
            description: Some("A programming guide to the borrow checker.".into()),
            excerpt: "Rust ownership".into(),
            text: "Rust programming code compiler ownership borrow checker rust rust".into(),
            word_count: 9,
            reading_time_minutes: 1,
        }
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            retries: 1,
            delay: Duration::from_millis(1),
            stage_timeout: Duration::from_secs(1),
        }
    }

    fn processor(
        extractor: Result<ExtractedContent, EnrichError>,
        analyzer: Arc<dyn ContentAnalyzer>,
        index: Arc<LinkIndex>,
    ) -> ItemProcessor {
        ItemProcessor::new(Arc::new(StaticExtractor(extractor)), analyzer, index)
    }

    async fn run(p: &ItemProcessor, settings: &ProcessingSettings, item: &Item) -> ProcessedItem {
        let cancel = CancellationToken::new();
        let ctx = ItemContext {
            job_id: "job-1",
            settings,
            retry: quick_retry(),
            cancel: &cancel,
        };
        p.process(&ctx, 0, item).await
    }

    #[tokio::test]
    async fn test_stopped_job_does_not_register_link() {
        let index = Arc::new(LinkIndex::new());
        let p = processor(Ok(page()), Arc::new(KeywordAnalyzer::new()), index.clone());
        let settings = ProcessingSettings::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = ItemContext {
            job_id: "job-1",
            settings: &settings,
            retry: quick_retry(),
            cancel: &cancel,
        };

        let processed = p.process(&ctx, 0, &Item::new("https://example.com/rust")).await;
        assert_eq!(index.len(), 0);
        assert!(processed.result.analysis.is_none());
        assert!(processed.result.duplicate_check.is_none());
    }

    #[test]
    fn test_parse_item_url() {
        assert!(parse_item_url("https://example.com/a").is_ok());
        assert!(parse_item_url("ftp://example.com").is_err());
        assert!(parse_item_url("not a url").is_err());
        assert!(parse_item_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_refine_analysis_filters_tags_and_summary() {
        let mut analysis = AiAnalysis::fallback(
            &Item::new("https://example.com"),
            None,
            &ProcessingSettings::default(),
        );
        analysis.tags = vec![
            ScoredLabel::new("low", 0.2),
            ScoredLabel::new("mid", 0.6),
            ScoredLabel::new("high", 0.9),
        ];
        analysis.summary = "é".repeat(80);
        let settings = ProcessingSettings {
            max_tags: 1,
            max_summary_length: 50,
            ..Default::default()
        };
        let refined = refine_analysis(analysis, &settings);
        assert_eq!(refined.tags.len(), 1);
        assert_eq!(refined.tags[0].label, "high");
        assert_eq!(refined.summary.chars().count(), 50);
    }

    #[tokio::test]
    async fn test_successful_item() {
        let index = Arc::new(LinkIndex::new());
        let p = processor(Ok(page()), Arc::new(KeywordAnalyzer::new()), index.clone());
        let item = Item::new("https://example.com/rust");

        let processed = run(&p, &ProcessingSettings::default(), &item).await;
        let result = processed.result;
        assert_eq!(result.status, ItemStatus::Success);
        assert!(result.warnings.is_empty());
        assert!(processed.text_bytes > 0);
        assert!(result.content.as_ref().unwrap().text.is_empty());
        assert_eq!(result.analysis.as_ref().unwrap().category.label, "programming");
        assert_eq!(
            result.duplicate_check.as_ref().unwrap().outcome,
            DuplicateOutcome::Unique
        );
        assert_eq!(result.attempts.total(), 3);
        assert_eq!(index.len(), 1);

        let again = run(&p, &ProcessingSettings::default(), &item).await.result;
        assert_eq!(
            again.duplicate_check.unwrap().outcome,
            DuplicateOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_failed_extraction_still_succeeds_with_warning() {
        let p = processor(
            Err(EnrichError::Http("connection refused".into())),
            Arc::new(KeywordAnalyzer::new()),
            Arc::new(LinkIndex::new()),
        );
        let item = Item::new("https://example.com/down").with_title("Down page");

        let result = run(&p, &ProcessingSettings::default(), &item).await.result;
        assert_eq!(result.status, ItemStatus::Success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Content extraction failed"));
        assert_eq!(result.attempts.extraction, 2);
        assert!(result.content.unwrap().is_empty());
        assert!(result.analysis.is_some());
    }

    #[tokio::test]
    async fn test_failed_analysis_uses_fallback() {
        let p = processor(Ok(page()), Arc::new(BrokenAnalyzer), Arc::new(LinkIndex::new()));
        let mut item = Item::new("https://example.com/x");
        item.category = Some("reading".into());
        item.tags = vec!["Rust".into()];

        let result = run(&p, &ProcessingSettings::default(), &item).await.result;
        let analysis = result.analysis.unwrap();
        assert!(analysis.is_fallback);
        assert_eq!(analysis.category.label, "reading");
        assert_eq!(analysis.tags[0].label, "rust");
        assert!(result.warnings[0].starts_with("AI analysis failed"));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_item() {
        let p = processor(Ok(page()), Arc::new(KeywordAnalyzer::new()), Arc::new(LinkIndex::new()));
        let result = run(&p, &ProcessingSettings::default(), &Item::new("nope")).await.result;
        assert_eq!(result.status, ItemStatus::Failed);
        assert!(result.error.unwrap().starts_with("Invalid URL"));
    }

    #[tokio::test]
    async fn test_excluded_domain_is_skipped() {
        let index = Arc::new(LinkIndex::new());
        let p = processor(Ok(page()), Arc::new(KeywordAnalyzer::new()), index.clone());
        let settings = ProcessingSettings {
            excluded_domains: vec!["example.com".into()],
            ..Default::default()
        };
        let result = run(&p, &settings, &Item::new("https://blog.example.com/a")).await.result;
        assert_eq!(result.status, ItemStatus::Skipped);
        assert!(result.content.is_none());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_stages_are_not_run() {
        let p = processor(
            Err(EnrichError::Http("should not be called".into())),
            Arc::new(BrokenAnalyzer),
            Arc::new(LinkIndex::new()),
        );
        let settings = ProcessingSettings {
            extract_content: false,
            analyze_content: false,
            check_duplicates: false,
            ..Default::default()
        };
        let result = run(&p, &settings, &Item::new("https://example.com")).await.result;
        assert_eq!(result.status, ItemStatus::Success);
        assert!(result.warnings.is_empty());
        assert_eq!(result.attempts.total(), 0);
        assert!(result.analysis.is_none());
    }
}
