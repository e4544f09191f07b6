//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Annotation carrying the CPU target average utilization (percent)
pub const CPU_TARGET_UTILIZATION_ANNOTATION: &str = "cpuTargetUtilization";

/// Annotation carrying the memory target average utilization (percent)
pub const MEMORY_TARGET_VALUE_ANNOTATION: &str = "memoryTargetValue";

/// Resource name of the CPU resource metric
pub const RESOURCE_CPU: &str = "cpu";

/// Resource name of the memory resource metric
pub const RESOURCE_MEMORY: &str = "memory";

/// Name of the work queue (used as a metrics label)
pub const QUEUE_NAME: &str = "hpa";

/// Default number of concurrent worker loops
pub const DEFAULT_WORKERS: usize = 5;

/// Number of times a key is retried before it is dropped out of the queue.
///
/// With the default exponential limiter (5ms * 2^(attempt-1)) the delays between
/// successive queuings are:
/// 5ms, 10ms, 20ms, 40ms, 80ms, 160ms, 320ms, 640ms, 1.3s, 2.6s, 5.1s, 10.2s, 20.4s, 41s, 82s
pub const DEFAULT_MAX_RETRIES: u32 = 15;

/// Per-item exponential backoff base delay (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Per-item exponential backoff maximum delay (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1_000_000;

/// Overall token bucket refill rate (tokens per second)
pub const DEFAULT_BUCKET_QPS: f64 = 10.0;

/// Overall token bucket size
pub const DEFAULT_BUCKET_BURST: u32 = 100;

/// Longest wait a single token bucket reservation is allowed to report (seconds)
pub const BUCKET_MAX_WAIT_SECS: u64 = 1_000;

/// Periodic resync of every cached key (seconds, 0 disables)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 0;

/// Pause before a worker loop that panicked is restarted, and before its key is handed out again (milliseconds)
pub const WORKER_LOOP_PERIOD_MS: u64 = 1_000;

/// Upper bound on the initial cache sync wait (seconds, 0 waits until shutdown)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 0;

/// How often the initial cache sync flag is polled (milliseconds)
pub const CACHE_SYNC_POLL_INTERVAL_MS: u64 = 100;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default log format (json, text)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "hpa_annotation_controller=info";

/// How long to wait for the HTTP server to bind at startup (seconds)
pub const SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How often the HTTP server startup is polled (milliseconds)
pub const SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Delay before the watch is retried after an unclassified stream error (seconds)
pub const WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Initial backoff applied when the API server throttles the watch (milliseconds)
pub const WATCH_BACKOFF_START_MS: u64 = 1_000;

/// Maximum backoff applied when the API server throttles the watch (milliseconds)
pub const WATCH_BACKOFF_MAX_MS: u64 = 30_000;
