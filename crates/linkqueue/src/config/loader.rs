use std::path::Path;

use crate::config::schema::QueueConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<QueueConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content)?;
    log::info!("Loaded queue config from {}", path.display());
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<QueueConfig, ConfigError> {
    let config: QueueConfig = serde_json::from_str(content)?;

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn test_nested_partial_config() {
        let config = load_config_from_str(
            r#"{
                "max_concurrent_jobs": 8,
                "processing_limits": { "retry_attempts": 0 },
                "maintenance": { "cleanup_failed_jobs_after_days": 90 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_jobs, 8);
        assert_eq!(config.processing_limits.retry_attempts, 0);
        assert_eq!(config.processing_limits.stage_timeout_secs, 30);
        assert_eq!(config.maintenance.cleanup_failed_jobs_after_days, 90);
        assert_eq!(config.maintenance.cleanup_completed_jobs_after_days, 7);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = load_config_from_str(r#"{"max_queue_size": 0}"#);
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_concurrent_jobs": 2}}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.max_concurrent_jobs, 2);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
