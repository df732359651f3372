use std::sync::{Arc, RwLock};

use super::schema::QueueConfig;

/// Process-wide config handle. Readers get a clone, writers swap the whole
/// value.
#[derive(Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<QueueConfig>>,
}

impl SharedConfig {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn get(&self) -> QueueConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                log::warn!("Config lock was poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    pub fn set(&self, config: QueueConfig) {
        match self.inner.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => {
                log::warn!("Config lock was poisoned, recovering");
                *poisoned.into_inner() = config;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_visible_to_clones() {
        let shared = SharedConfig::default();
        let other = shared.clone();
        other.set(QueueConfig {
            max_concurrent_jobs: 9,
            ..Default::default()
        });
        assert_eq!(shared.get().max_concurrent_jobs, 9);
    }
}
