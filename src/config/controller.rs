//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use serde::Serialize;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerConfig {
    /// Number of concurrent worker loops draining the queue
    pub workers: usize,
    /// Failed syncs are requeued this many times before the key is dropped
    pub max_retries: u32,
    /// Per-item exponential backoff base delay (milliseconds)
    pub backoff_base_ms: u64,
    /// Per-item exponential backoff maximum delay (milliseconds)
    pub backoff_max_ms: u64,
    /// Overall token bucket refill rate (tokens per second)
    pub bucket_qps: f64,
    /// Overall token bucket size
    pub bucket_burst: u32,
    /// Periodic re-enqueue of every cached key (seconds, 0 disables)
    pub resync_period_secs: u64,
    /// Upper bound on the initial cache sync wait (seconds, 0 waits until shutdown)
    pub cache_sync_timeout_secs: u64,
    /// Restrict the watch to a single namespace (None watches all namespaces)
    pub watch_namespace: Option<String>,
    /// HTTP server port for metrics and probes
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            workers: DEFAULT_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            bucket_qps: DEFAULT_BUCKET_QPS,
            bucket_burst: DEFAULT_BUCKET_BURST,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            cache_sync_timeout_secs: DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            watch_namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Unparseable values fall back to their defaults, as does a `BUCKET_QPS`
    /// that is not a finite positive rate.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        Self {
            workers: parse_or_default(&lookup, "WORKERS", DEFAULT_WORKERS),
            max_retries: parse_or_default(&lookup, "MAX_RETRIES", DEFAULT_MAX_RETRIES),
            backoff_base_ms: parse_or_default(&lookup, "BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max_ms: parse_or_default(&lookup, "BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            bucket_qps: Some(parse_or_default(&lookup, "BUCKET_QPS", DEFAULT_BUCKET_QPS))
                .filter(|qps| qps.is_finite() && *qps > 0.0)
                .unwrap_or(DEFAULT_BUCKET_QPS),
            bucket_burst: parse_or_default(&lookup, "BUCKET_BURST", DEFAULT_BUCKET_BURST),
            resync_period_secs: parse_or_default(
                &lookup,
                "RESYNC_PERIOD_SECS",
                DEFAULT_RESYNC_PERIOD_SECS,
            ),
            cache_sync_timeout_secs: parse_or_default(
                &lookup,
                "CACHE_SYNC_TIMEOUT_SECS",
                DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            ),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            metrics_port: parse_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            log_format: lookup("LOG_FORMAT")
                .map(|v| v.to_lowercase())
                .unwrap_or_else(|| DEFAULT_LOG_FORMAT.to_string()),
        }
    }

    /// Get per-item backoff base duration
    #[must_use]
    pub fn backoff_base_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Get per-item backoff max duration
    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get the resync period, `None` when disabled
    #[must_use]
    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period_secs > 0).then(|| Duration::from_secs(self.resync_period_secs))
    }

    /// Get the cache sync timeout, `None` when unbounded
    #[must_use]
    pub fn cache_sync_timeout(&self) -> Option<Duration> {
        (self.cache_sync_timeout_secs > 0)
            .then(|| Duration::from_secs(self.cache_sync_timeout_secs))
    }
}

/// Read a key through `lookup` and parse it, or return the default value
fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
