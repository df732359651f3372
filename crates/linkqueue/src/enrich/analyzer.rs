//! Keyword-pattern analyzer.
//!
//! Works without any model: categories come from keyword hits, tags from
//! matched keywords and frequent terms, and the summary is extractive. Also
//! provides the fallback analysis used when the configured analyzer fails.

use std::collections::HashMap;

use async_trait::async_trait;

use super::ContentAnalyzer;
use crate::config::ProcessingSettings;
use crate::error::EnrichError;
use crate::job::Item;
use crate::pipeline::result::{
    AiAnalysis, ExtractedContent, Keywords, QualityScore, ScoredLabel, Sentiment,
};

struct CategoryPattern {
    category: &'static str,
    keywords: &'static [&'static str],
}

/// Known link categories for keyword matching.
const PATTERNS: &[CategoryPattern] = &[
    CategoryPattern {
        category: "programming",
        keywords: &[
            "rust",
            "python",
            "javascript",
            "compiler",
            "function",
            "library",
            "api",
            "github",
            "code",
        ],
    },
    CategoryPattern {
        category: "technology",
        keywords: &[
            "software",
            "hardware",
            "cloud",
            "startup",
            "device",
            "internet",
            "ai",
            "machine learning",
        ],
    },
    CategoryPattern {
        category: "science",
        keywords: &[
            "research",
            "study",
            "physics",
            "biology",
            "chemistry",
            "experiment",
            "scientists",
        ],
    },
    CategoryPattern {
        category: "business",
        keywords: &[
            "market",
            "company",
            "revenue",
            "investor",
            "customers",
            "strategy",
            "sales",
        ],
    },
    CategoryPattern {
        category: "finance",
        keywords: &[
            "stock",
            "bank",
            "interest rate",
            "inflation",
            "crypto",
            "budget",
            "tax",
        ],
    },
    CategoryPattern {
        category: "health",
        keywords: &[
            "health",
            "medical",
            "doctor",
            "patients",
            "disease",
            "nutrition",
            "fitness",
        ],
    },
    CategoryPattern {
        category: "news",
        keywords: &[
            "breaking",
            "reported",
            "government",
            "election",
            "officials",
            "announced",
        ],
    },
    CategoryPattern {
        category: "education",
        keywords: &[
            "tutorial",
            "course",
            "learn",
            "lesson",
            "students",
            "guide",
            "beginner",
        ],
    },
    CategoryPattern {
        category: "entertainment",
        keywords: &[
            "movie", "music", "game", "album", "series", "trailer", "review",
        ],
    },
];

const STOP_WORDS_EN: &[&str] = &[
    "the", "and", "is", "of", "to", "in", "that", "it", "for", "with", "this", "are", "on",
];
const STOP_WORDS_DE: &[&str] = &[
    "der", "die", "das", "und", "ist", "nicht", "mit", "ein", "eine", "auf", "für", "sich",
];
const STOP_WORDS_FR: &[&str] = &[
    "le", "la", "les", "et", "est", "des", "une", "pour", "dans", "pas", "que", "sur",
];
const STOP_WORDS_ES: &[&str] = &[
    "el", "los", "las", "y", "es", "del", "una", "para", "por", "con", "que", "como",
];

const POSITIVE_WORDS: &[&str] = &[
    "great", "excellent", "good", "love", "best", "amazing", "improved", "success", "easy",
    "fast", "win", "happy",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "worst", "poor", "fail", "failure", "broken", "slow", "problem", "crisis", "hate",
    "bug", "risk",
];

const FREQUENT_TERM_MIN_COUNT: usize = 3;

/// Pattern-based analyzer.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Runs the analysis synchronously. Never fails.
    pub fn analyze_text(
        &self,
        item: &Item,
        content: Option<&ExtractedContent>,
        settings: &ProcessingSettings,
    ) -> AiAnalysis {
        let corpus = corpus_of(item, content);
        let lower = corpus.to_lowercase();
        let words = tokenize(&lower);

        let (category, mut tags) = categorize(&lower, item);
        for (term, count) in frequent_terms(&words) {
            if tags.iter().any(|t| t.label == term) {
                continue;
            }
            let confidence = (0.4 + 0.05 * count as f32).min(0.9);
            tags.push(ScoredLabel::new(term, confidence));
        }
        for tag in &item.tags {
            let label = tag.to_lowercase();
            if !tags.iter().any(|t| t.label == label) {
                tags.push(ScoredLabel::new(label, 0.95));
            }
        }
        tags.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let keywords = ranked_keywords(&words);
        AiAnalysis {
            category,
            tags,
            summary: summarize_text(item, content),
            language: settings
                .language
                .clone()
                .unwrap_or_else(|| detect_language(&words).to_string()),
            quality: quality_of(item, content),
            sentiment: sentiment_of(&words),
            keywords,
            content_type: content_type_of(&item.url, &lower).to_string(),
            is_fallback: false,
        }
    }
}

#[async_trait]
impl ContentAnalyzer for KeywordAnalyzer {
    async fn analyze(
        &self,
        item: &Item,
        content: Option<&ExtractedContent>,
        settings: &ProcessingSettings,
    ) -> Result<AiAnalysis, EnrichError> {
        Ok(self.analyze_text(item, content, settings))
    }
}

impl AiAnalysis {
    /// Low-confidence analysis built from caller metadata alone.
    pub fn fallback(
        item: &Item,
        content: Option<&ExtractedContent>,
        settings: &ProcessingSettings,
    ) -> Self {
        let category = match &item.category {
            Some(c) => ScoredLabel::new(c.clone(), 0.3),
            None => ScoredLabel::new("uncategorized", 0.0),
        };
        let tags = item
            .tags
            .iter()
            .map(|t| ScoredLabel::new(t.to_lowercase(), 0.5))
            .collect();

        AiAnalysis {
            category,
            tags,
            summary: summarize_text(item, content),
            language: settings
                .language
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            quality: QualityScore {
                credibility: credibility_of(item, content),
                ..Default::default()
            },
            sentiment: Sentiment::Neutral,
            keywords: Keywords::default(),
            content_type: content_type_of(&item.url, "").to_string(),
            is_fallback: true,
        }
    }
}

fn corpus_of(item: &Item, content: Option<&ExtractedContent>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(t) = content.and_then(|c| c.title.as_deref()).or(item.title.as_deref()) {
        parts.push(t);
    }
    if let Some(d) = content
        .and_then(|c| c.description.as_deref())
        .or(item.description.as_deref())
    {
        parts.push(d);
    }
    if let Some(c) = content {
        parts.push(&c.text);
    }
    parts.join(" ")
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_term(lower: &str, term: &str) -> bool {
    if term.contains(' ') {
        return lower.contains(term);
    }
    tokenize(lower).contains(&term)
}

/// Best-matching category plus a tag per matched keyword.
fn categorize(lower: &str, item: &Item) -> (ScoredLabel, Vec<ScoredLabel>) {
    let mut best: Option<(&CategoryPattern, Vec<&str>)> = None;

    for pattern in PATTERNS {
        let matched: Vec<&str> = pattern
            .keywords
            .iter()
            .copied()
            .filter(|k| contains_term(lower, k))
            .collect();
        let better = best
            .as_ref()
            .map_or(!matched.is_empty(), |(_, m)| matched.len() > m.len());
        if better {
            best = Some((pattern, matched));
        }
    }

    match best {
        Some((pattern, matched)) => {
            let confidence = (matched.len() as f32 / pattern.keywords.len() as f32).min(0.9);
            let tags = matched
                .iter()
                .map(|k| {
                    let hits = lower.matches(k).count();
                    ScoredLabel::new(*k, (0.5 + 0.1 * hits as f32).min(0.95))
                })
                .collect();
            (ScoredLabel::new(pattern.category, confidence), tags)
        }
        None => {
            let category = match &item.category {
                Some(c) => ScoredLabel::new(c.clone(), 0.5),
                None => ScoredLabel::new("uncategorized", 0.1),
            };
            (category, Vec::new())
        }
    }
}

fn is_stop_word(word: &str) -> bool {
    [STOP_WORDS_EN, STOP_WORDS_DE, STOP_WORDS_FR, STOP_WORDS_ES]
        .iter()
        .any(|list| list.contains(&word))
}

/// Term counts for content words, most frequent first, ties alphabetical.
fn term_counts<'a>(words: &[&'a str]) -> Vec<(&'a str, usize)> {
    let mut counts: HashMap<&'a str, usize> = HashMap::new();
    for &word in words {
        if word.chars().count() >= 4 && !is_stop_word(word) && !word.chars().all(char::is_numeric)
        {
            *counts.entry(word).or_default() += 1;
        }
    }
    let mut counts: Vec<(&'a str, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    counts
}

fn frequent_terms(words: &[&str]) -> Vec<(String, usize)> {
    term_counts(words)
        .into_iter()
        .filter(|(_, count)| *count >= FREQUENT_TERM_MIN_COUNT)
        .take(10)
        .map(|(term, count)| (term.to_string(), count))
        .collect()
}

fn ranked_keywords(words: &[&str]) -> Keywords {
    let ranked: Vec<String> = term_counts(words)
        .into_iter()
        .take(10)
        .map(|(term, _)| term.to_string())
        .collect();
    let split = ranked.len().min(5);
    Keywords {
        primary: ranked[..split].to_vec(),
        secondary: ranked[split..].to_vec(),
    }
}

fn detect_language(words: &[&str]) -> &'static str {
    let candidates = [
        ("en", STOP_WORDS_EN),
        ("de", STOP_WORDS_DE),
        ("fr", STOP_WORDS_FR),
        ("es", STOP_WORDS_ES),
    ];
    let (lang, hits) = candidates
        .iter()
        .map(|(lang, list)| (*lang, words.iter().filter(|w| list.contains(w)).count()))
        .max_by_key(|(_, hits)| *hits)
        .unwrap_or(("unknown", 0));
    if hits == 0 {
        "unknown"
    } else {
        lang
    }
}

fn summarize_text(item: &Item, content: Option<&ExtractedContent>) -> String {
    if let Some(d) = content.and_then(|c| c.description.clone()).or(item.description.clone()) {
        return d;
    }
    if let Some(c) = content.filter(|c| !c.text.is_empty()) {
        let sentences: Vec<&str> = c
            .text
            .split_inclusive(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| s.split_whitespace().count() >= 4)
            .take(3)
            .collect();
        if !sentences.is_empty() {
            return sentences.join(" ");
        }
        return c.excerpt.clone();
    }
    content
        .and_then(|c| c.title.clone())
        .or(item.title.clone())
        .unwrap_or_default()
}

fn credibility_of(item: &Item, content: Option<&ExtractedContent>) -> f32 {
    let mut score = 0.0;
    if item.url.starts_with("https://") {
        score += 0.4;
    }
    if content.and_then(|c| c.title.as_ref()).or(item.title.as_ref()).is_some() {
        score += 0.3;
    }
    if content
        .and_then(|c| c.description.as_ref())
        .or(item.description.as_ref())
        .is_some()
    {
        score += 0.3;
    }
    score
}

fn quality_of(item: &Item, content: Option<&ExtractedContent>) -> QualityScore {
    let credibility = credibility_of(item, content);
    let (readability, depth) = match content.filter(|c| c.word_count > 0) {
        Some(c) => {
            let sentences = c
                .text
                .split(['.', '!', '?'])
                .filter(|s| !s.trim().is_empty())
                .count()
                .max(1);
            let avg = c.word_count as f32 / sentences as f32;
            let readability = 1.0 - ((avg - 17.5).abs() / 40.0).min(1.0);
            let depth = (c.word_count as f32 / 1500.0).min(1.0);
            (readability, depth)
        }
        None => (0.0, 0.0),
    };
    QualityScore {
        overall: 0.4 * readability + 0.35 * depth + 0.25 * credibility,
        readability,
        depth,
        credibility,
    }
}

fn sentiment_of(words: &[&str]) -> Sentiment {
    let positive = words.iter().filter(|w| POSITIVE_WORDS.contains(w)).count() as f32;
    let negative = words.iter().filter(|w| NEGATIVE_WORDS.contains(w)).count() as f32;
    if positive + negative == 0.0 {
        return Sentiment::Neutral;
    }
    let score = (positive - negative) / (positive + negative);
    if score > 0.2 {
        Sentiment::Positive
    } else if score < -0.2 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn content_type_of(url: &str, lower: &str) -> &'static str {
    let url = url.to_lowercase();
    if ["youtube.com", "youtu.be", "vimeo.com"]
        .iter()
        .any(|h| url.contains(h))
    {
        "video"
    } else if ["github.com", "gitlab.com", "codeberg.org"]
        .iter()
        .any(|h| url.contains(h))
    {
        "repository"
    } else if url.ends_with(".pdf") {
        "document"
    } else if url.contains("/docs") || lower.contains("documentation") {
        "documentation"
    } else if lower.contains("tutorial") || lower.contains("how to") {
        "tutorial"
    } else if lower.is_empty() {
        "webpage"
    } else {
        "article"
    }
}
