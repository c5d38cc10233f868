//! Configuration module for the prospector application.
//!
//! This module handles loading and parsing configuration from environment variables
//! using the figment crate. It supports flexible duration parsing that accepts both
//! numeric values (interpreted as seconds) and duration strings with units.

use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Main application configuration containing all sub-configurations
#[derive(Deserialize, Clone)]
pub struct Config {
    /// Log level for the application
    ///
    /// This value is used to set the log level for this application's target specifically.
    /// e.g. "debug" would be similar to "warn,prospector=debug,..."
    ///
    /// Valid values are: "trace", "debug", "info", "warn", "error"
    /// Defaults to "info" if not specified
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port for the web server (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database connection URL
    pub database_url: String,
    /// Graceful shutdown timeout duration
    ///
    /// Accepts both numeric values (seconds) and duration strings
    /// Defaults to 8 seconds if not specified
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    /// API key for the remote fetcher (browser-as-a-service)
    pub fetcher_api_key: String,
    /// Base URL of the fetcher's submission API
    #[serde(default = "default_fetcher_base_url")]
    pub fetcher_base_url: String,
    /// Public origin under which the fetcher can reach our webhook endpoint
    ///
    /// When this is wrong, jobs start and submit but no callbacks ever arrive;
    /// the startup self-test surfaces that through the `webhook` service status.
    #[serde(default = "default_webhook_base_url")]
    pub webhook_base_url: String,
    /// Base URL of the catalog being crawled; seed search URLs are built from it
    #[serde(default = "default_catalog_base_url")]
    pub catalog_base_url: String,

    /// Crawl pacing and retry configuration
    #[serde(flatten)]
    pub pacing: PacingConfig,

    /// How long exclusion rules are cached in memory before re-reading the store
    #[serde(
        default = "default_exclusion_cache_ttl",
        deserialize_with = "deserialize_duration"
    )]
    pub exclusion_cache_ttl: Duration,
    /// Interval of the background sweeper that revives due retries
    #[serde(
        default = "default_sweeper_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub sweeper_interval: Duration,
    /// Age after which a `submitted` item whose callback never arrived is
    /// returned to the queue with an incremented retry count
    #[serde(
        default = "default_stale_submitted_after",
        deserialize_with = "deserialize_duration"
    )]
    pub stale_submitted_after: Duration,
}

/// Submission pacing and retry-ladder knobs, grouped so the scheduler and the
/// webhook ingest path share one copy.
#[derive(Deserialize, Clone, Debug)]
pub struct PacingConfig {
    /// Lower bound of the uniform inter-submission delay within one job
    #[serde(default = "default_submit_delay_min_seconds")]
    pub submit_delay_min_seconds: u64,
    /// Upper bound of the uniform inter-submission delay within one job
    #[serde(default = "default_submit_delay_max_seconds")]
    pub submit_delay_max_seconds: u64,
    /// Base delay of the exponential retry ladder (doubles per retry)
    #[serde(default = "default_retry_base_seconds")]
    pub retry_base_seconds: u64,
    /// Upper bound of the uniform jitter added to each retry delay
    #[serde(default = "default_retry_jitter_seconds")]
    pub retry_jitter_seconds: u64,
    /// Retries allowed per queue item before it is marked failed
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    /// Ready-queue depth required before paced product submissions resume
    #[serde(default = "default_warmup_queue_depth")]
    pub warmup_queue_depth: i64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            submit_delay_min_seconds: default_submit_delay_min_seconds(),
            submit_delay_max_seconds: default_submit_delay_max_seconds(),
            retry_base_seconds: default_retry_base_seconds(),
            retry_jitter_seconds: default_retry_jitter_seconds(),
            max_retries: default_max_retries(),
            warmup_queue_depth: default_warmup_queue_depth(),
        }
    }
}

/// Default log level of "info"
fn default_log_level() -> String {
    "info".to_string()
}

/// Default port of 8080
fn default_port() -> u16 {
    8080
}

/// Default shutdown timeout of 8 seconds
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

/// Default fetcher endpoint
fn default_fetcher_base_url() -> String {
    "https://chrome.browserless.io".to_string()
}

/// Default webhook origin (local development)
fn default_webhook_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Default catalog origin
fn default_catalog_base_url() -> String {
    "https://www.cjdropshipping.com".to_string()
}

/// Default minimum submission delay (5 seconds)
fn default_submit_delay_min_seconds() -> u64 {
    5
}

/// Default maximum submission delay (15 seconds)
fn default_submit_delay_max_seconds() -> u64 {
    15
}

/// Default retry base delay (15 minutes); doubles per retry and doubles as
/// the anti-bot cooldown after a block page
fn default_retry_base_seconds() -> u64 {
    900
}

/// Default retry jitter bound (5 minutes)
fn default_retry_jitter_seconds() -> u64 {
    300
}

/// Default retry allowance per queue item
fn default_max_retries() -> i32 {
    3
}

/// Default warm-up queue depth
fn default_warmup_queue_depth() -> i64 {
    15
}

/// Default exclusion-rule cache TTL (60 seconds)
fn default_exclusion_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

/// Default sweeper interval (60 seconds)
fn default_sweeper_interval() -> Duration {
    Duration::from_secs(60)
}

/// Default staleness window for submitted items (30 minutes)
fn default_stale_submitted_after() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Duration parser configured to handle various time units with seconds as default
///
/// Supports:
/// - Seconds (s) - default unit
/// - Milliseconds (ms)
/// - Minutes (m)
///
/// Does not support fractions, exponents, or infinity values
/// Allows for whitespace between the number and the time unit
/// Allows for multiple time units to be specified (summed together, e.g "10s 2m" = 120 + 10 = 130 seconds)
const DURATION_PARSER: DurationParser<'static> = DurationParser::builder()
    .time_units(&[TimeUnit::Second, TimeUnit::MilliSecond, TimeUnit::Minute])
    .parse_multiple(None)
    .allow_time_unit_delimiter()
    .disable_infinity()
    .disable_fraction()
    .disable_exponent()
    .default_unit(TimeUnit::Second)
    .build();

/// Custom deserializer for duration fields that accepts both numeric and string values
///
/// This deserializer handles the flexible duration parsing by accepting:
/// - Unsigned integers (interpreted as seconds)
/// - Signed integers (interpreted as seconds, must be non-negative)
/// - Strings (parsed using the fundu duration parser)
///
/// # Examples
///
/// - `1` -> 1 second
/// - `"30s"` -> 30 seconds
/// - `"2 m"` -> 2 minutes
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            DURATION_PARSER
                .parse(value)
                .map_err(|e| {
                    serde::de::Error::custom(format!(
                        "Invalid duration format '{}': {}. Examples: '5' (5 seconds), '3500ms', '30s', '2m'",
                        value, e
                    ))
                })?
                .try_into()
                .map_err(|e| serde::de::Error::custom(format!("Duration conversion error: {}", e)))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(serde::de::Error::custom("Duration cannot be negative"));
            }
            Ok(Duration::from_secs(value as u64))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::{
        Figment,
        providers::{Format, Toml},
    };

    #[test]
    fn pacing_defaults_match_documented_values() {
        let pacing = PacingConfig::default();
        assert_eq!(pacing.submit_delay_min_seconds, 5);
        assert_eq!(pacing.submit_delay_max_seconds, 15);
        assert_eq!(pacing.retry_base_seconds, 900);
        assert_eq!(pacing.retry_jitter_seconds, 300);
        assert_eq!(pacing.max_retries, 3);
        assert_eq!(pacing.warmup_queue_depth, 15);
    }

    #[test]
    fn config_extracts_with_overrides_and_duration_strings() {
        let config: Config = Figment::new()
            .merge(Toml::string(
                r#"
                database_url = "postgres://localhost/prospector"
                fetcher_api_key = "secret"
                submit_delay_min_seconds = 2
                shutdown_timeout = "30s"
                max_retries = 5
                stale_submitted_after = "45m"
                "#,
            ))
            .extract()
            .expect("config should extract");

        assert_eq!(config.port, 8080);
        assert_eq!(config.pacing.submit_delay_min_seconds, 2);
        assert_eq!(config.pacing.submit_delay_max_seconds, 15);
        assert_eq!(config.pacing.max_retries, 5);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.stale_submitted_after, Duration::from_secs(45 * 60));
    }
}
