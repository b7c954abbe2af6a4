//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::{CoverageTerms, DEFAULT_COVERAGE_PERCENT, WorkflowConfig};
use settlement::RetryPolicy;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL; unset means the in-memory store
/// - `DEFAULT_COVERAGE_PERCENTAGE`: insurer share when a request names no terms (default `80`)
/// - `RECEIPT_PREFIX`: receipt number prefix (default `"RCPT"`)
/// - `SETTLEMENT_MAX_ATTEMPTS`: attempts per settlement, including the first (default `3`)
/// - `SETTLEMENT_INITIAL_BACKOFF_MS`: first retry delay (default `50`)
/// - `SETTLEMENT_MAX_BACKOFF_MS`: retry delay cap (default `1000`)
///
/// Unparsable values fall back to the default with a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub default_coverage_percent: f64,
    pub receipt_prefix: String,
    pub settlement_max_attempts: u32,
    pub settlement_initial_backoff_ms: u64,
    pub settlement_max_backoff_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let default_coverage_percent = parse_or(
            &lookup,
            "DEFAULT_COVERAGE_PERCENTAGE",
            defaults.default_coverage_percent,
        );
        let default_coverage_percent = if CoverageTerms::percentage(default_coverage_percent).is_ok()
        {
            default_coverage_percent
        } else {
            tracing::warn!(
                value = default_coverage_percent,
                "DEFAULT_COVERAGE_PERCENTAGE outside [0, 100], using default"
            );
            defaults.default_coverage_percent
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            default_coverage_percent,
            receipt_prefix: lookup("RECEIPT_PREFIX")
                .filter(|prefix| !prefix.trim().is_empty())
                .unwrap_or(defaults.receipt_prefix),
            settlement_max_attempts: parse_or(
                &lookup,
                "SETTLEMENT_MAX_ATTEMPTS",
                defaults.settlement_max_attempts,
            ),
            settlement_initial_backoff_ms: parse_or(
                &lookup,
                "SETTLEMENT_INITIAL_BACKOFF_MS",
                defaults.settlement_initial_backoff_ms,
            ),
            settlement_max_backoff_ms: parse_or(
                &lookup,
                "SETTLEMENT_MAX_BACKOFF_MS",
                defaults.settlement_max_backoff_ms,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Engine settings derived from this configuration.
    pub fn workflow_config(&self) -> WorkflowConfig {
        match CoverageTerms::percentage(self.default_coverage_percent) {
            Ok(terms) => WorkflowConfig::default().with_default_coverage(terms),
            Err(_) => WorkflowConfig::default(),
        }
    }

    /// Settlement retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.settlement_max_attempts,
            Duration::from_millis(self.settlement_initial_backoff_ms),
            Duration::from_millis(self.settlement_max_backoff_ms),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            default_coverage_percent: DEFAULT_COVERAGE_PERCENT,
            receipt_prefix: "RCPT".to_string(),
            settlement_max_attempts: 3,
            settlement_initial_backoff_ms: 50,
            settlement_max_backoff_ms: 1000,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "invalid configuration value, using default");
                default
            }
        },
    }
}
