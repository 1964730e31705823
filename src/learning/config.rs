// src/learning/config.rs
use std::time::Duration;

/// Runtime tunables for the learning pipeline. Environment variables
/// override the defaults; unparseable values fall back silently.
#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// Maximum simultaneously running workers.
    pub max_parallel: usize,
    /// Bounded job queue depth.
    pub queue_bound: usize,
    /// TTL for cached topic results.
    pub cache_ttl: Duration,
    /// Bounded history ring capacity.
    pub history_cap: usize,
    /// How long `stop()` waits for in-flight workers to wind down.
    pub cleanup_timeout: Duration,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            queue_bound: 64,
            cache_ttl: Duration::from_secs(3600),
            history_cap: 1000,
            cleanup_timeout: Duration::from_secs(10),
        }
    }
}

impl LearningConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_parallel: env_parse("LEARNING_MAX_PARALLEL", d.max_parallel).max(1),
            queue_bound: env_parse("LEARNING_QUEUE_BOUND", d.queue_bound).max(1),
            cache_ttl: Duration::from_secs(env_parse(
                "LEARNING_CACHE_TTL_SECS",
                d.cache_ttl.as_secs(),
            )),
            history_cap: env_parse("LEARNING_HISTORY_CAP", d.history_cap).max(1),
            cleanup_timeout: Duration::from_secs(env_parse(
                "LEARNING_CLEANUP_TIMEOUT_SECS",
                d.cleanup_timeout.as_secs(),
            )),
        }
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_overrides_and_bad_values_fall_back() {
        std::env::set_var("LEARNING_MAX_PARALLEL", "3");
        std::env::set_var("LEARNING_QUEUE_BOUND", "not-a-number");
        let cfg = LearningConfig::from_env();
        assert_eq!(cfg.max_parallel, 3);
        assert_eq!(cfg.queue_bound, LearningConfig::default().queue_bound);
        std::env::remove_var("LEARNING_MAX_PARALLEL");
        std::env::remove_var("LEARNING_QUEUE_BOUND");
    }
}
