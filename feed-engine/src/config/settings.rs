//! Typed configuration read from the environment.
//!
//! Unset variables take their default. Set but unparsable ones log a warning
//! and take their default too, so a typo never stops the engine.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use feed_engine_pipeline::aggregator::AggregatorConfig;
use feed_engine_pipeline::consumer::QueueConfig;
use feed_engine_pipeline::feed::FeedConfig;
use feed_engine_pipeline::orchestrator::OrchestratorConfig;
use feed_engine_pipeline::threshold::ThresholdConfig;
use feed_engine_shared::types::RetryPolicy;
use tracing::warn;

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Collections smaller than this do not produce feed activity.
const DEFAULT_COLLECTION_MIN_FEED_SIZE: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Connection mode for the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry the connection every `retry_interval` until it succeeds.
    Retry,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_mode: ConnectionMode::FailFast,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
        }
    }
}

/// Everything the engine reads from its environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub storage: StorageBackend,
    pub database: DatabaseSettings,
    /// Base URL of the domain service providing followers and entity data.
    pub domain_api_url: Option<String>,
    pub queue: QueueConfig,
    pub orchestrator: OrchestratorConfig,
    pub aggregator: AggregatorConfig,
    pub threshold: ThresholdConfig,
    pub feed: FeedConfig,
    pub collection_min_feed_size: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Postgres,
            database: DatabaseSettings::default(),
            domain_api_url: None,
            queue: QueueConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            aggregator: AggregatorConfig::default(),
            threshold: ThresholdConfig::default(),
            feed: FeedConfig::default(),
            collection_min_feed_size: DEFAULT_COLLECTION_MIN_FEED_SIZE,
        }
    }
}

impl Settings {
    /// Reads every setting from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `STORAGE_BACKEND`: "postgres" or "memory" (default: postgres)
    /// - `DATABASE_URL`: PostgreSQL connection string, required for postgres
    /// - `DATABASE_MAX_CONNECTIONS` (default: 10)
    /// - `DATABASE_CONNECTION_MODE`: "fail-fast" or "retry" (default: fail-fast)
    /// - `DATABASE_RETRY_INTERVAL_SECS` (default: 15)
    /// - `DOMAIN_API_URL`: domain service base URL
    /// - `FEED_WORKERS`, `FEED_POLL_BATCH_SIZE`, `FEED_POLL_IDLE_MS`, `FEED_LEASE_SECS`
    /// - `FEED_MAX_RETRIES`, `FEED_BACKOFF_BASE_MS`, `FEED_BACKOFF_MAX_SECS`
    /// - `FEED_DISPLAY_LIMIT`, `FEED_AGGREGATE_WINDOW_HOURS`
    /// - `THRESHOLD_USER_FOLLOWERS`, `THRESHOLD_REVIEW_LIKES`,
    ///   `THRESHOLD_REVIEW_COMMENTS`, `THRESHOLD_GAME_OWNED_COUNT`,
    ///   `THRESHOLD_GAME_OWNED_WINDOW_HOURS`
    /// - `COLLECTION_MIN_FEED_SIZE` (default: 5)
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        let storage = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => {
                warn!(value = other, "Invalid STORAGE_BACKEND, defaulting to 'postgres'");
                StorageBackend::Postgres
            }
        };

        let connection_mode = match env::var("DATABASE_CONNECTION_MODE")
            .unwrap_or_else(|_| "fail-fast".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => ConnectionMode::FailFast,
            "retry" => ConnectionMode::Retry,
            other => {
                warn!(value = other, "Invalid DATABASE_CONNECTION_MODE, defaulting to 'fail-fast'");
                ConnectionMode::FailFast
            }
        };

        let database = DatabaseSettings {
            url: non_empty_var("DATABASE_URL"),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", defaults.database.max_connections),
            connection_mode,
            retry_interval: Duration::from_secs(parse_var(
                "DATABASE_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
        };

        let retry = RetryPolicy {
            max_retries: parse_var("FEED_MAX_RETRIES", defaults.queue.retry.max_retries),
            backoff_base: ChronoDuration::milliseconds(parse_var(
                "FEED_BACKOFF_BASE_MS",
                defaults.queue.retry.backoff_base.num_milliseconds(),
            )),
            backoff_max: ChronoDuration::seconds(parse_var(
                "FEED_BACKOFF_MAX_SECS",
                defaults.queue.retry.backoff_max.num_seconds(),
            )),
        };

        let queue = QueueConfig {
            batch_size: parse_var("FEED_POLL_BATCH_SIZE", defaults.queue.batch_size),
            idle_interval: Duration::from_millis(parse_var(
                "FEED_POLL_IDLE_MS",
                defaults.queue.idle_interval.as_millis() as u64,
            )),
            lease: ChronoDuration::seconds(parse_var("FEED_LEASE_SECS", defaults.queue.lease.num_seconds())),
            retry,
        };

        let orchestrator = OrchestratorConfig {
            workers: parse_var("FEED_WORKERS", defaults.orchestrator.workers),
            ..defaults.orchestrator
        };

        let aggregator = AggregatorConfig {
            window: ChronoDuration::hours(parse_var(
                "FEED_AGGREGATE_WINDOW_HOURS",
                defaults.aggregator.window.num_hours(),
            )),
            ..defaults.aggregator
        };

        let threshold = ThresholdConfig {
            user_followers: parse_var("THRESHOLD_USER_FOLLOWERS", defaults.threshold.user_followers),
            review_likes: parse_var("THRESHOLD_REVIEW_LIKES", defaults.threshold.review_likes),
            review_comments: parse_var("THRESHOLD_REVIEW_COMMENTS", defaults.threshold.review_comments),
            game_owned_count: parse_var("THRESHOLD_GAME_OWNED_COUNT", defaults.threshold.game_owned_count),
            game_owned_window: ChronoDuration::hours(parse_var(
                "THRESHOLD_GAME_OWNED_WINDOW_HOURS",
                defaults.threshold.game_owned_window.num_hours(),
            )),
        };

        let feed = FeedConfig {
            display_limit: parse_var("FEED_DISPLAY_LIMIT", defaults.feed.display_limit),
            ..defaults.feed
        };

        Self {
            storage,
            database,
            domain_api_url: non_empty_var("DOMAIN_API_URL"),
            queue,
            orchestrator,
            aggregator,
            threshold,
            feed,
            collection_min_feed_size: parse_var("COLLECTION_MIN_FEED_SIZE", defaults.collection_min_feed_size),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Parses `name`, falling back to `default` when unset or invalid.
fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Ok(raw) = env::var(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(e) => {
            warn!(variable = name, value = %raw, error = %e, default = %default, "Invalid value, using default");
            default
        }
    }
}
