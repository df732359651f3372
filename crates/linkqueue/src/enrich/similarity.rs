//! In-memory link collection with URL and title similarity.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use url::Url;

use super::{KnownLink, SimilarityFinder};
use crate::error::EnrichError;
use crate::pipeline::result::{DuplicateCheck, ExtractedContent, SimilarLink};

const TITLE_WEIGHT: f32 = 0.8;
const HOST_WEIGHT: f32 = 0.2;

/// Edit distance over chars, two rows.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / longer length`, case-insensitive. Empty titles score 0.
pub fn title_similarity(a: &str, b: &str) -> f32 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    1.0 - levenshtein(&a, &b) as f32 / longest as f32
}

fn host_of(url: &Url) -> String {
    url.host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_ascii_lowercase()
}

/// Canonical form for exact-match comparison: scheme and `www.` ignored,
/// trailing slash, fragment and `utm_*` parameters dropped.
pub fn normalize_url(url: &Url) -> String {
    let host = host_of(url);
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    let query: Vec<String> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_"))
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if query.is_empty() {
        format!("{}{}{}", host, port, path)
    } else {
        format!("{}{}{}?{}", host, port, path, query.join("&"))
    }
}

struct IndexedLink {
    link: KnownLink,
    normalized: String,
    host: String,
}

/// Known links, scanned linearly on lookup.
#[derive(Default)]
pub struct LinkIndex {
    links: RwLock<Vec<IndexedLink>>,
}

impl LinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<IndexedLink>> {
        match self.links.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Link index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<IndexedLink>> {
        match self.links.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Link index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Adds a link. Unparseable URLs are skipped with a warning.
    pub fn insert(&self, link: KnownLink) {
        let Ok(url) = Url::parse(&link.url) else {
            log::warn!("Not indexing link {} with an invalid URL", link.id);
            return;
        };
        let entry = IndexedLink {
            normalized: normalize_url(&url),
            host: host_of(&url),
            link,
        };
        self.write().push(entry);
    }

    /// Scores every known link against `url` and `title`.
    pub fn score(&self, url: &Url, title: Option<&str>) -> Vec<SimilarLink> {
        let normalized = normalize_url(url);
        let host = host_of(url);
        self.read()
            .iter()
            .map(|known| {
                let similarity = if known.normalized == normalized {
                    1.0
                } else {
                    let titles = match (title, known.link.title.as_deref()) {
                        (Some(a), Some(b)) => title_similarity(a, b),
                        _ => 0.0,
                    };
                    let same_host = if known.host == host { 1.0 } else { 0.0 };
                    TITLE_WEIGHT * titles + HOST_WEIGHT * same_host
                };
                SimilarLink {
                    id: known.link.id.clone(),
                    url: known.link.url.clone(),
                    title: known.link.title.clone(),
                    similarity,
                }
            })
            .filter(|m| m.similarity > DuplicateCheck::SIMILAR_THRESHOLD)
            .collect()
    }
}

#[async_trait]
impl SimilarityFinder for LinkIndex {
    async fn find_similar(
        &self,
        url: &Url,
        content: Option<&ExtractedContent>,
    ) -> Result<Vec<SimilarLink>, EnrichError> {
        Ok(self.score(url, content.and_then(|c| c.title.as_deref())))
    }

    async fn register(&self, link: KnownLink) -> Result<(), EnrichError> {
        self.insert(link);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, url: &str, title: Option<&str>) -> KnownLink {
        KnownLink {
            id: id.into(),
            url: url.into(),
            title: title.map(Into::into),
        }
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("über", "uber"), 1);
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("Rust Book", "rust book"), 1.0);
        assert_eq!(title_similarity("", "rust"), 0.0);
        assert!((title_similarity("abcd", "abcf") - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_url() {
        let a = Url::parse("https://www.Example.com/post/?utm_source=x#top").unwrap();
        let b = Url::parse("http://example.com/post").unwrap();
        assert_eq!(normalize_url(&a), normalize_url(&b));

        let c = Url::parse("https://example.com/post?id=2").unwrap();
        assert_ne!(normalize_url(&b), normalize_url(&c));
    }

    #[test]
    fn test_exact_url_is_duplicate() {
        let index = LinkIndex::new();
        index.insert(link("1", "https://example.com/a/", None));

        let url = Url::parse("https://www.example.com/a").unwrap();
        let matches = index.score(&url, None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].similarity, 1.0);
    }

    #[test]
    fn test_title_and_host_similarity() {
        let index = LinkIndex::new();
        index.insert(link("1", "https://blog.example.com/one", Some("Async Rust in Practice")));
        index.insert(link("2", "https://other.org/x", Some("Async Rust in Practice")));
        index.insert(link("3", "https://blog.example.com/two", Some("Gardening")));

        let url = Url::parse("https://blog.example.com/three").unwrap();
        let matches = index.score(&url, Some("Async Rust in Practice"));
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!((matches[0].similarity - 1.0).abs() < 1e-6);
        assert!((matches[1].similarity - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_url_not_indexed() {
        let index = LinkIndex::new();
        index.insert(link("1", "not a url", None));
        assert!(index.is_empty());
    }
}
