//! Configuration for the release watcher.
//!
//! Configuration can be built programmatically, deserialized from YAML/JSON,
//! or read from the `KW_*` environment variables the watcher has always
//! honoured.
//!
//! # Quick Start
//!
//! ```rust
//! use release_watch::config::WatcherConfig;
//!
//! let config = WatcherConfig {
//!     namespace: "prod".into(),
//!     workers: 4,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! WatcherConfig
//! ├── namespace: String              # "" = every namespace
//! ├── config_diff_enabled: bool      # attach values diffs to events
//! ├── workers: usize                 # concurrent pipeline workers
//! ├── cache_sync_timeout: String     # startup sync barrier
//! ├── lookup_timeout: String         # predecessor point lookups
//! ├── shutdown_drain_timeout: String # per-task join deadline
//! └── queue: QueueConfig             # retry ceiling, backoff, token bucket
//! ```
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `KW_NAMESPACE` | `namespace` |
//! | `KW_CHART_VALUES_DIFF_ENABLED` | `config_diff_enabled` |
//! | `KW_WORKERS` | `workers` |
//! | `KW_CACHE_SYNC_TIMEOUT` | `cache_sync_timeout` |

use crate::error::{Result, WatchError};
use crate::resilience::{RateLimitConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const ENV_NAMESPACE: &str = "KW_NAMESPACE";
pub const ENV_CONFIG_DIFF: &str = "KW_CHART_VALUES_DIFF_ENABLED";
pub const ENV_WORKERS: &str = "KW_WORKERS";
pub const ENV_CACHE_SYNC_TIMEOUT: &str = "KW_CACHE_SYNC_TIMEOUT";

// ═══════════════════════════════════════════════════════════════════════════════
// WatcherConfig: passed to Controller::new()
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level watcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Namespace to watch. Empty watches all namespaces.
    #[serde(default)]
    pub namespace: String,

    /// Attach a values diff to each event.
    /// Values can contain secrets; leave off unless sinks are trusted.
    #[serde(default)]
    pub config_diff_enabled: bool,

    /// Number of worker loops draining the queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long startup waits for the initial listing (e.g., "60s").
    #[serde(default = "default_cache_sync_timeout")]
    pub cache_sync_timeout: String,

    /// Deadline for each predecessor lookup.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout: String,

    /// How long shutdown waits for each task to finish.
    #[serde(default = "default_shutdown_drain_timeout")]
    pub shutdown_drain_timeout: String,

    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_workers() -> usize {
    1
}

fn default_cache_sync_timeout() -> String {
    "60s".to_string()
}

fn default_lookup_timeout() -> String {
    "10s".to_string()
}

fn default_shutdown_drain_timeout() -> String {
    "10s".to_string()
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            config_diff_enabled: false,
            workers: default_workers(),
            cache_sync_timeout: default_cache_sync_timeout(),
            lookup_timeout: default_lookup_timeout(),
            shutdown_drain_timeout: default_shutdown_drain_timeout(),
            queue: QueueConfig::default(),
        }
    }
}

impl WatcherConfig {
    /// Short timeouts and fast backoff for tests.
    pub fn for_testing() -> Self {
        Self {
            cache_sync_timeout: "2s".to_string(),
            lookup_timeout: "500ms".to_string(),
            shutdown_drain_timeout: "2s".to_string(),
            queue: QueueConfig::for_testing(),
            ..Default::default()
        }
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through `lookup`, starting from the defaults.
    ///
    /// An unparsable diff flag is logged and leaves diffing off. An
    /// unparsable worker count is a configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            config.namespace = namespace.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_CONFIG_DIFF) {
            config.config_diff_enabled = match parse_bool(&raw) {
                Some(enabled) => enabled,
                None => {
                    warn!(variable = ENV_CONFIG_DIFF, value = %raw, "Not a boolean, values diff disabled");
                    false
                }
            };
        }

        if let Some(raw) = lookup(ENV_WORKERS) {
            config.workers = raw
                .trim()
                .parse()
                .map_err(|_| WatchError::Config(format!("{ENV_WORKERS} must be a positive integer, got {raw:?}")))?;
        }

        if let Some(raw) = lookup(ENV_CACHE_SYNC_TIMEOUT) {
            config.cache_sync_timeout = raw.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(WatchError::Config("workers must be at least 1".into()));
        }
        for (field, value) in [
            ("cache_sync_timeout", &self.cache_sync_timeout),
            ("lookup_timeout", &self.lookup_timeout),
            ("shutdown_drain_timeout", &self.shutdown_drain_timeout),
        ] {
            humantime::parse_duration(value)
                .map_err(|e| WatchError::Config(format!("{field}: invalid duration {value:?}: {e}")))?;
        }
        self.queue.validate()
    }

    pub fn cache_sync_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.cache_sync_timeout).unwrap_or(Duration::from_secs(60))
    }

    pub fn lookup_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.lookup_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn shutdown_drain_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.shutdown_drain_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Whether every namespace is watched.
    pub fn is_cluster_wide(&self) -> bool {
        self.namespace.is_empty()
    }
}

/// Same spellings Go's `strconv.ParseBool` accepts.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QueueConfig: retry ceiling and requeue rate limiting
// ═══════════════════════════════════════════════════════════════════════════════

/// Work queue retry and rate limit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Times an item is processed before it is dropped and reported.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// First requeue delay (ms); doubles per consecutive failure.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Requeue delay ceiling (seconds).
    #[serde(default = "default_max_delay_sec")]
    pub max_delay_sec: u64,

    /// Sustained requeues per second across all items.
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Requeue burst allowance.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
}

fn default_max_retries() -> usize {
    5
}

fn default_base_delay_ms() -> u64 {
    5
}

fn default_max_delay_sec() -> u64 {
    1000
}

fn default_rate_limit_per_sec() -> u32 {
    10
}

fn default_rate_limit_burst() -> u32 {
    100
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_sec: default_max_delay_sec(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            rate_limit_burst: default_rate_limit_burst(),
        }
    }
}

impl QueueConfig {
    pub fn for_testing() -> Self {
        Self {
            base_delay_ms: 1,
            max_delay_sec: 1,
            rate_limit_per_sec: 10_000,
            rate_limit_burst: 10_000,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(WatchError::Config("queue.max_retries must be at least 1".into()));
        }
        if self.base_delay_ms == 0 {
            return Err(WatchError::Config("queue.base_delay_ms must be at least 1".into()));
        }
        Ok(())
    }

    /// Per-item backoff schedule.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            initial_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_sec),
            backoff_factor: 2.0,
        }
    }

    /// Shared requeue token bucket.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            burst_size: self.rate_limit_burst,
            refill_rate: self.rate_limit_per_sec,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
