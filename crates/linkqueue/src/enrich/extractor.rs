//! HTTP content extraction with a per-URL TTL cache.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use regex::Regex;
use url::Url;

use super::{truncate_chars, ContentExtractor};
use crate::error::EnrichError;
use crate::pipeline::result::ExtractedContent;
use crate::sanitize::redact_url;

static RE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static RE_META: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\s+([^>]*)>").unwrap());
static RE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});
static RE_INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<noscript[^>]*>.*?</noscript>|<!--.*?-->")
        .unwrap()
});
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static RE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const USER_AGENT: &str = concat!("linkqueue/", env!("CARGO_PKG_VERSION"));
const WORDS_PER_MINUTE: usize = 200;
const EXCERPT_CHARS: usize = 300;
const MAX_TEXT_CHARS: usize = 100_000;

pub struct HttpExtractor {
    client: reqwest::Client,
    cache: Cache<String, ExtractedContent>,
}

impl HttpExtractor {
    pub fn new(timeout: Duration) -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EnrichError::Http(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        let cache = Cache::builder()
            .max_capacity(1024)
            .time_to_live(Duration::from_secs(3600))
            .build();
        Self { client, cache }
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, url: &Url) -> Result<ExtractedContent, EnrichError> {
        if let Some(cached) = self.cache.get(url.as_str()).await {
            tracing::trace!(url = %redact_url(url), "extraction cache hit");
            return Ok(cached);
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| EnrichError::Http(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::Status {
                status: status.as_u16(),
                url: redact_url(url),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| EnrichError::Http(e.without_url().to_string()))?;

        let content = parse_html(&body);
        self.cache
            .insert(url.as_str().to_string(), content.clone())
            .await;
        Ok(content)
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn clean(text: &str) -> String {
    RE_SPACE
        .replace_all(&decode_entities(text), " ")
        .trim()
        .to_string()
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Reads the `content` of the first `<meta>` whose `name` or `property`
/// matches one of `keys`, in key order.
fn meta_content(html: &str, keys: &[&str]) -> Option<String> {
    let metas: Vec<Vec<(String, String)>> = RE_META
        .captures_iter(html)
        .map(|cap| {
            RE_ATTR
                .captures_iter(&cap[1])
                .map(|a| {
                    let value = a.get(2).or_else(|| a.get(3)).map_or("", |m| m.as_str());
                    (a[1].to_ascii_lowercase(), value.to_string())
                })
                .collect()
        })
        .collect();

    keys.iter().find_map(|key| {
        metas.iter().find_map(|attrs| {
            let named = attrs
                .iter()
                .any(|(k, v)| (k == "name" || k == "property") && v.eq_ignore_ascii_case(key));
            if !named {
                return None;
            }
            attrs
                .iter()
                .find(|(k, _)| k == "content")
                .and_then(|(_, v)| non_empty(clean(v)))
        })
    })
}

/// Extracts title, description and visible text from an HTML document.
pub fn parse_html(html: &str) -> ExtractedContent {
    let title = RE_TITLE
        .captures(html)
        .and_then(|c| non_empty(clean(&c[1])))
        .or_else(|| meta_content(html, &["og:title", "twitter:title"]));
    let description = meta_content(html, &["description", "og:description", "twitter:description"]);

    let visible = RE_INVISIBLE.replace_all(html, " ");
    let visible = RE_TAG.replace_all(&visible, " ");
    let text = truncate_chars(&clean(&visible), MAX_TEXT_CHARS);

    let word_count = text.split_whitespace().count();
    let reading_time_minutes = word_count.div_ceil(WORDS_PER_MINUTE) as u32;
    let excerpt = excerpt_of(&text);

    ExtractedContent {
        title,
        description,
        excerpt,
        text,
        word_count,
        reading_time_minutes,
    }
}

fn excerpt_of(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut = truncate_chars(text, EXCERPT_CHARS);
    match cut.rfind(' ') {
        Some(idx) if idx > EXCERPT_CHARS / 2 => format!("{}…", &cut[..idx]),
        _ => format!("{}…", cut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html><head>
  <title>  Async Rust &amp; Tokio </title>
  <meta name="description" content="A guide to async Rust.">
  <meta property='og:title' content='OG title'>
  <style>body { color: red; }</style>
  <script>var tracking = "ignore me";</script>
</head>
<body><h1>Hello</h1><p>Tokio is an asynchronous runtime.</p><!-- hidden --></body></html>"#;

    #[test]
    fn test_parse_html_extracts_metadata() {
        let content = parse_html(PAGE);
        assert_eq!(content.title.as_deref(), Some("Async Rust & Tokio"));
        assert_eq!(content.description.as_deref(), Some("A guide to async Rust."));
        assert!(content.text.contains("Tokio is an asynchronous runtime."));
        assert!(!content.text.contains("ignore me"));
        assert!(!content.text.contains("color: red"));
        assert!(!content.text.contains("hidden"));
        assert_eq!(content.reading_time_minutes, 1);
    }

    #[test]
    fn test_og_title_fallback() {
        let content = parse_html(r#"<meta property="og:title" content="Only OG">"#);
        assert_eq!(content.title.as_deref(), Some("Only OG"));
        assert!(content.description.is_none());
    }

    #[test]
    fn test_empty_document() {
        let content = parse_html("");
        assert!(content.is_empty());
        assert_eq!(content.word_count, 0);
        assert_eq!(content.reading_time_minutes, 0);
    }

    #[test]
    fn test_reading_time_rounds_up() {
        let body = "word ".repeat(401);
        let content = parse_html(&body);
        assert_eq!(content.word_count, 401);
        assert_eq!(content.reading_time_minutes, 3);
        assert!(content.excerpt.ends_with('…'));
        assert!(content.excerpt.chars().count() <= EXCERPT_CHARS + 1);
    }
}
