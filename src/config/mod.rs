//! Configuration module for the newsroom application.
//!
//! Handles loading and parsing configuration from environment variables using
//! the figment crate. Duration fields accept both numeric values (interpreted
//! as seconds) and duration strings with units.

use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Main application configuration containing all sub-configurations
#[derive(Deserialize, Clone)]
pub struct Config {
    /// Log level for the application
    ///
    /// This value is used to set the log level for this application's target specifically.
    /// e.g. "debug" would be similar to "warn,newsroom=debug,..."
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

    /// Base URL for the news search provider
    ///
    /// Defaults to "https://news.google.com/rss" if not specified
    #[serde(default = "default_news_base_url")]
    pub news_base_url: String,

    /// Category validation limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Crawl execution and scheduling configuration
    #[serde(default)]
    pub crawler: CrawlerConfig,
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

/// Default news provider base URL
fn default_news_base_url() -> String {
    "https://news.google.com/rss".to_string()
}

/// Validation limits for category configuration
#[derive(Deserialize, Clone, Debug)]
pub struct LimitsConfig {
    /// Maximum number of keywords (and exclude keywords) per category
    #[serde(default = "default_max_keywords_per_category")]
    pub max_keywords_per_category: usize,
    /// Maximum length of a single keyword
    #[serde(default = "default_max_keyword_length")]
    pub max_keyword_length: usize,
    /// Maximum length of a category name
    #[serde(default = "default_max_category_name_length")]
    pub max_category_name_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_keywords_per_category: default_max_keywords_per_category(),
            max_keyword_length: default_max_keyword_length(),
            max_category_name_length: default_max_category_name_length(),
        }
    }
}

fn default_max_keywords_per_category() -> usize {
    20
}

fn default_max_keyword_length() -> usize {
    100
}

fn default_max_category_name_length() -> usize {
    255
}

/// Crawl execution, scheduling, and maintenance configuration
#[derive(Deserialize, Clone, Debug)]
pub struct CrawlerConfig {
    /// Maximum number of concurrently executing crawl jobs (worker count)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Hard ceiling on a single job's execution time
    #[serde(
        default = "default_job_execution_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub job_execution_timeout: Duration,
    /// Terminal jobs older than this many days are deleted by cleanup
    #[serde(default = "default_job_cleanup_days")]
    pub job_cleanup_days: i64,
    /// Running jobs whose started_at is older than this many hours are reset
    #[serde(default = "default_stuck_job_threshold_hours")]
    pub stuck_job_threshold_hours: i64,
    /// Per-worker crawl starts per minute
    #[serde(default = "default_crawl_rate_limit_per_minute")]
    pub crawl_rate_limit_per_minute: u32,
    /// Extractor browser pool size
    #[serde(default = "default_extractor_browsers")]
    pub extractor_browsers: usize,
    /// Tabs per extractor browser; browsers * tabs bounds in-flight extractions
    #[serde(default = "default_extractor_tabs_per_browser")]
    pub extractor_tabs_per_browser: usize,
    /// Cadence of the schedule scanner tick
    #[serde(
        default = "default_schedule_scan_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub schedule_scan_interval: Duration,
    /// Cadence of the job health monitor
    #[serde(
        default = "default_health_monitor_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub health_monitor_interval: Duration,
    /// Cadence of old-job cleanup
    #[serde(
        default = "default_cleanup_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub cleanup_interval: Duration,
    /// Search results requested when a job does not specify max_results
    #[serde(default = "default_default_max_results")]
    pub default_max_results: u32,
    /// Hard upper bound on max_results
    #[serde(default = "default_max_results_limit")]
    pub max_results_limit: u32,
}

impl CrawlerConfig {
    /// In-flight extraction budget: browsers * tabs (default 5 * 10 = 50).
    pub fn extractor_concurrency(&self) -> usize {
        (self.extractor_browsers * self.extractor_tabs_per_browser).max(1)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_execution_timeout: default_job_execution_timeout(),
            job_cleanup_days: default_job_cleanup_days(),
            stuck_job_threshold_hours: default_stuck_job_threshold_hours(),
            crawl_rate_limit_per_minute: default_crawl_rate_limit_per_minute(),
            extractor_browsers: default_extractor_browsers(),
            extractor_tabs_per_browser: default_extractor_tabs_per_browser(),
            schedule_scan_interval: default_schedule_scan_interval(),
            health_monitor_interval: default_health_monitor_interval(),
            cleanup_interval: default_cleanup_interval(),
            default_max_results: default_default_max_results(),
            max_results_limit: default_max_results_limit(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    10
}

/// Default job execution ceiling of 30 minutes
fn default_job_execution_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_job_cleanup_days() -> i64 {
    30
}

fn default_stuck_job_threshold_hours() -> i64 {
    2
}

/// Default crawl rate of 20 job starts per minute per worker
fn default_crawl_rate_limit_per_minute() -> u32 {
    20
}

fn default_extractor_browsers() -> usize {
    5
}

fn default_extractor_tabs_per_browser() -> usize {
    10
}

/// Default schedule scan cadence of 60 seconds
fn default_schedule_scan_interval() -> Duration {
    Duration::from_secs(60)
}

/// Default health monitor cadence of 5 minutes
fn default_health_monitor_interval() -> Duration {
    Duration::from_secs(300)
}

/// Default cleanup cadence of 1 hour
fn default_cleanup_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_default_max_results() -> u32 {
    100
}

fn default_max_results_limit() -> u32 {
    500
}

/// Duration parser configured to handle various time units with seconds as default
///
/// Supports:
/// - Seconds (s) - default unit
/// - Milliseconds (ms)
/// - Minutes (m)
/// - Hours (h)
///
/// Does not support fractions, exponents, or infinity values
/// Allows for whitespace between the number and the time unit
/// Allows for multiple time units to be specified (summed together, e.g "10s 2m" = 120 + 10 = 130 seconds)
const DURATION_PARSER: DurationParser<'static> = DurationParser::builder()
    .time_units(&[
        TimeUnit::Second,
        TimeUnit::MilliSecond,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ])
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
    use figment::{Figment, providers::Serialized};

    #[test]
    fn defaults_match_documented_values() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(serde_json::json!({
                "database_url": "postgres://localhost/newsroom"
            })))
            .extract()
            .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.limits.max_keywords_per_category, 20);
        assert_eq!(config.limits.max_keyword_length, 100);
        assert_eq!(config.limits.max_category_name_length, 255);
        assert_eq!(config.crawler.max_concurrent_jobs, 10);
        assert_eq!(
            config.crawler.job_execution_timeout,
            Duration::from_secs(1800)
        );
        assert_eq!(config.crawler.job_cleanup_days, 30);
        assert_eq!(config.crawler.stuck_job_threshold_hours, 2);
        assert_eq!(config.crawler.extractor_concurrency(), 50);
        assert_eq!(config.crawler.default_max_results, 100);
        assert_eq!(config.crawler.max_results_limit, 500);
    }

    #[test]
    fn duration_accepts_strings_and_numbers() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(serde_json::json!({
                "database_url": "postgres://localhost/newsroom",
                "shutdown_timeout": "2m",
                "crawler": { "job_execution_timeout": 600 }
            })))
            .extract()
            .unwrap();

        assert_eq!(config.shutdown_timeout, Duration::from_secs(120));
        assert_eq!(
            config.crawler.job_execution_timeout,
            Duration::from_secs(600)
        );
    }
}
