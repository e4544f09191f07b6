//! # Backoff and Rate Limiting
//!
//! Decides how long a failed key waits before it is handed back to the queue.
//!
//! - [`ExponentialBackoff`] doubles from a base delay up to a cap
//! - [`ItemExponentialFailureRateLimiter`] keeps one backoff per key
//! - [`BucketRateLimiter`] is an overall token bucket shared by all keys
//! - [`MaxOfRateLimiter`] combines limiters and waits for the slowest one
//!
//! ## Usage
//!
//! ```rust
//! use hpa_annotation_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(5));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(10));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(20));
//! ```

use crate::config::ControllerConfig;
use crate::constants::BUCKET_MAX_WAIT_SECS;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Exponential backoff calculator
///
/// Each call to [`next_backoff`](Self::next_backoff) returns `base * 2^attempts`
/// (capped at `max`) and advances the attempt counter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: 0,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = 2u32
            .checked_pow(self.attempts)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max));
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Number of backoffs handed out since creation or the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Decides the requeue delay of a key and tracks how often it was requeued
pub trait RateLimiter<K>: Send + Sync {
    /// Delay before `item` may be processed again; counts as one requeue
    fn when(&self, item: &K) -> Duration;

    /// Stop tracking `item` (its failures are cleared)
    fn forget(&self, item: &K);

    /// How many times `item` has been requeued
    fn num_requeues(&self, item: &K) -> u32;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`
pub struct ItemExponentialFailureRateLimiter<K> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<K, ExponentialBackoff>>,
}

impl<K> ItemExponentialFailureRateLimiter<K> {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> fmt::Debug for ItemExponentialFailureRateLimiter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemExponentialFailureRateLimiter")
            .field("base", &self.base)
            .field("max", &self.max)
            .field("tracked", &lock(&self.failures).len())
            .finish()
    }
}

impl<K> RateLimiter<K> for ItemExponentialFailureRateLimiter<K>
where
    K: Clone + Eq + Hash + Send,
{
    fn when(&self, item: &K) -> Duration {
        lock(&self.failures)
            .entry(item.clone())
            .or_insert_with(|| ExponentialBackoff::new(self.base, self.max))
            .next_backoff()
    }

    fn forget(&self, item: &K) {
        lock(&self.failures).remove(item);
    }

    fn num_requeues(&self, item: &K) -> u32 {
        lock(&self.failures)
            .get(item)
            .map_or(0, ExponentialBackoff::attempts)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Overall token bucket limiter
///
/// Refills `qps` tokens per second up to `burst`. Every call to `when` reserves
/// one token and returns how long the caller has to wait for it. It does not
/// track individual keys. A non-positive or non-finite `qps` disables the
/// bucket, and a wait longer than [`BUCKET_MAX_WAIT_SECS`] is capped.
#[derive(Debug)]
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }
}

impl<K> RateLimiter<K> for BucketRateLimiter {
    fn when(&self, _item: &K) -> Duration {
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Duration::ZERO;
        }
        let mut bucket = lock(&self.bucket);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last_refill = now;
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            let max_wait = Duration::from_secs(BUCKET_MAX_WAIT_SECS);
            Duration::try_from_secs_f64(-bucket.tokens / self.qps)
                .map_or(max_wait, |wait| wait.min(max_wait))
        }
    }

    fn forget(&self, _item: &K) {}

    fn num_requeues(&self, _item: &K) -> u32 {
        0
    }
}

/// Returns the worst case of all contained limiters
pub struct MaxOfRateLimiter<K> {
    limiters: Vec<Box<dyn RateLimiter<K>>>,
}

impl<K> MaxOfRateLimiter<K> {
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter<K>>>) -> Self {
        Self { limiters }
    }
}

impl<K> fmt::Debug for MaxOfRateLimiter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxOfRateLimiter")
            .field("limiters", &self.limiters.len())
            .finish()
    }
}

impl<K> RateLimiter<K> for MaxOfRateLimiter<K> {
    fn when(&self, item: &K) -> Duration {
        // Every limiter must observe the call, so no short-circuiting here.
        self.limiters
            .iter()
            .map(|limiter| limiter.when(item))
            .fold(Duration::ZERO, Duration::max)
    }

    fn forget(&self, item: &K) {
        for limiter in &self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(&self, item: &K) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// Per-key exponential backoff combined with an overall token bucket
#[must_use]
pub fn default_controller_rate_limiter<K>(config: &ControllerConfig) -> MaxOfRateLimiter<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::new(
            config.backoff_base_duration(),
            config.backoff_max_duration(),
        )),
        Box::new(BucketRateLimiter::new(config.bucket_qps, config.bucket_burst)),
    ])
}
