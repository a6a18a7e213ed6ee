//! Configuration Module
//!
//! Handles loading cleaner settings from environment variables.

use std::env;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::cache::CLEAN_FREQUENCY;

/// Default sweep period when none is configured.
pub const DEFAULT_CLEAN_PERIOD_MS: u64 = 1000;

/// Default name prefix for sweep worker threads.
pub const DEFAULT_THREAD_PREFIX: &str = "weakcache-cleaner";

static GLOBAL_CONFIG: Lazy<CleanerConfig> = Lazy::new(CleanerConfig::from_env);

/// Cleaner configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanerConfig {
    /// Sweep period used by caches created without an explicit period
    pub default_period: Duration,
    /// Prefix for background worker thread names
    pub thread_name_prefix: String,
}

impl CleanerConfig {
    /// Creates a new CleanerConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `WEAKCACHE_CLEAN_PERIOD_MS` - Default sweep period in milliseconds (default: 1000).
    ///   Zero and unparsable values fall back to the default.
    /// - `WEAKCACHE_THREAD_PREFIX` - Worker thread name prefix (default: weakcache-cleaner)
    pub fn from_env() -> Self {
        let period_ms = env::var("WEAKCACHE_CLEAN_PERIOD_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_CLEAN_PERIOD_MS);

        Self {
            default_period: Duration::from_millis(period_ms),
            thread_name_prefix: env::var("WEAKCACHE_THREAD_PREFIX")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_THREAD_PREFIX.to_string()),
        }
    }

    /// Process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static CleanerConfig {
        &GLOBAL_CONFIG
    }

    /// Name given to the worker thread sweeping at `period`.
    pub fn thread_name(&self, period: Duration) -> String {
        format!("{}-{}ms", self.thread_name_prefix, period.as_millis())
    }
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            default_period: CLEAN_FREQUENCY,
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CleanerConfig::default();
        assert_eq!(config.default_period, Duration::from_secs(1));
        assert_eq!(config.thread_name_prefix, "weakcache-cleaner");
    }

    #[test]
    fn test_config_from_env() {
        // Single test touches the env so parallel tests don't race on it
        env::remove_var("WEAKCACHE_CLEAN_PERIOD_MS");
        env::remove_var("WEAKCACHE_THREAD_PREFIX");
        assert_eq!(CleanerConfig::from_env(), CleanerConfig::default());

        env::set_var("WEAKCACHE_CLEAN_PERIOD_MS", "250");
        env::set_var("WEAKCACHE_THREAD_PREFIX", "sweeper");
        let config = CleanerConfig::from_env();
        assert_eq!(config.default_period, Duration::from_millis(250));
        assert_eq!(config.thread_name_prefix, "sweeper");

        env::set_var("WEAKCACHE_CLEAN_PERIOD_MS", "0");
        assert_eq!(
            CleanerConfig::from_env().default_period,
            Duration::from_millis(DEFAULT_CLEAN_PERIOD_MS)
        );

        env::set_var("WEAKCACHE_CLEAN_PERIOD_MS", "soon");
        assert_eq!(
            CleanerConfig::from_env().default_period,
            Duration::from_millis(DEFAULT_CLEAN_PERIOD_MS)
        );

        env::remove_var("WEAKCACHE_CLEAN_PERIOD_MS");
        env::remove_var("WEAKCACHE_THREAD_PREFIX");
    }

    #[test]
    fn test_thread_name() {
        let config = CleanerConfig::default();
        assert_eq!(
            config.thread_name(Duration::from_millis(1500)),
            "weakcache-cleaner-1500ms"
        );
    }
}
