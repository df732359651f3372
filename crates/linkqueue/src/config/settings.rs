//! Per-job processing settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::check_range;
use crate::error::ConfigError;

/// Settings supplied with a submission. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingSettings {
    #[serde(default = "default_true")]
    pub extract_content: bool,
    #[serde(default = "default_true")]
    pub analyze_content: bool,
    #[serde(default = "default_true")]
    pub check_duplicates: bool,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default = "default_max_summary_length")]
    pub max_summary_length: usize,
    #[serde(default)]
    pub language: Option<String>,
    /// Passed through to the analyzer untouched.
    #[serde(default)]
    pub custom_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub excluded_domains: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_max_tags() -> usize {
    10
}

fn default_max_summary_length() -> usize {
    500
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            extract_content: true,
            analyze_content: true,
            check_duplicates: true,
            confidence_threshold: default_confidence_threshold(),
            max_tags: default_max_tags(),
            max_summary_length: default_max_summary_length(),
            language: None,
            custom_prompts: BTreeMap::new(),
            excluded_domains: Vec::new(),
        }
    }
}

impl ProcessingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confidence_threshold.is_nan() {
            return Err(ConfigError::Validation {
                message: "confidence_threshold must be a number".to_string(),
            });
        }
        check_range("confidence_threshold", self.confidence_threshold, 0.0, 1.0)?;
        check_range("max_tags", self.max_tags, 1, 50)?;
        check_range("max_summary_length", self.max_summary_length, 50, 5000)?;
        for domain in &self.excluded_domains {
            if domain.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: "excluded_domains must not contain empty entries".to_string(),
                });
            }
        }
        Ok(())
    }

    /// True when `host` equals an excluded domain or is a subdomain of one.
    pub fn is_excluded(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.excluded_domains.iter().any(|domain| {
            let domain = domain.trim().trim_start_matches("*.").to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_merges_with_defaults() {
        let settings: ProcessingSettings =
            serde_json::from_str(r#"{"max_tags": 3, "extract_content": false}"#).unwrap();
        assert_eq!(settings.max_tags, 3);
        assert!(!settings.extract_content);
        assert!(settings.analyze_content);
        assert_eq!(settings.max_summary_length, 500);
        settings.validate().unwrap();
    }

    #[test]
    fn test_bounds() {
        let settings = ProcessingSettings {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = ProcessingSettings {
            max_summary_length: 10,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = ProcessingSettings {
            confidence_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_excluded_domains_match_subdomains() {
        let settings = ProcessingSettings {
            excluded_domains: vec!["example.com".into()],
            ..Default::default()
        };
        assert!(settings.is_excluded("example.com"));
        assert!(settings.is_excluded("www.Example.com"));
        assert!(!settings.is_excluded("notexample.com"));
    }
}
