use std::str::FromStr;
use std::time::Duration;

use crate::stats::{accumulator::DEFAULT_BASELINE_RATING, RetryPolicy};

/// Server configuration read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: String,
    /// `None` runs with in-memory repositories
    pub database_url: Option<String>,
    pub retry_policy: RetryPolicy,
    pub lock_timeout: Duration,
    pub rating_baseline: f64,
    pub leaderboard_default_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            retry_policy: RetryPolicy::default(),
            lock_timeout: Duration::from_millis(2000),
            rating_baseline: DEFAULT_BASELINE_RATING,
            leaderboard_default_limit: 100,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| parse_var::<u64>(&lookup, key);

        let retry_policy = RetryPolicy::new(
            parse_var::<u32>(&lookup, "STATS_MAX_ATTEMPTS")
                .unwrap_or(defaults.retry_policy.max_attempts),
            parsed("STATS_RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_policy.base_delay),
            parsed("STATS_RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_policy.max_delay),
        );

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            retry_policy,
            lock_timeout: parsed("STATS_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            rating_baseline: parse_var::<f64>(&lookup, "STATS_RATING_BASELINE")
                .filter(|value| value.is_finite())
                .unwrap_or(defaults.rating_baseline),
            leaderboard_default_limit: parse_var::<usize>(&lookup, "LEADERBOARD_DEFAULT_LIMIT")
                .unwrap_or(defaults.leaderboard_default_limit),
        }
    }
}

/// Out-of-range values fail to parse like any other garbage
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(config_from(&[]), AppConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("DATABASE_URL", "postgres://localhost/blockstats"),
            ("STATS_MAX_ATTEMPTS", "8"),
            ("STATS_LOCK_TIMEOUT_MS", "500"),
            ("STATS_RATING_BASELINE", "1200"),
            ("LEADERBOARD_DEFAULT_LIMIT", "25"),
        ]);

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/blockstats")
        );
        assert_eq!(config.retry_policy.max_attempts, 8);
        assert_eq!(config.lock_timeout, Duration::from_millis(500));
        assert_eq!(config.rating_baseline, 1200.0);
        assert_eq!(config.leaderboard_default_limit, 25);
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("STATS_MAX_ATTEMPTS", "lots"),
            ("STATS_RATING_BASELINE", "NaN"),
            ("DATABASE_URL", "  "),
        ]);

        assert_eq!(config.retry_policy.max_attempts, 5);
        assert_eq!(config.rating_baseline, DEFAULT_BASELINE_RATING);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn out_of_range_attempts_fall_back_instead_of_wrapping() {
        // 2^32 + 3 would truncate to 3 with a plain cast
        let config = config_from(&[("STATS_MAX_ATTEMPTS", "4294967299")]);
        assert_eq!(config.retry_policy.max_attempts, 5);
    }
}
