//! # Error Policy
//!
//! Retry handling for failed syncs and classification of watch stream errors.

use crate::controller::error::ControllerError;
use crate::controller::key::ResourceKey;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::ReconcilerError;
use crate::observability::{metrics, ErrorSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// What the retry policy did with a key after its sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sync succeeded; failure history cleared
    Forgotten,
    /// Sync failed and the key was requeued with backoff
    Requeued { attempt: u32 },
    /// Sync failed too often; the key was dropped until a fresh event re-adds it
    Dropped,
}

/// Bounded retry with per-key rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Apply the policy to the result of syncing `key`
    ///
    /// Must be called before [`WorkQueue::done`] so a requeued key is not delivered
    /// to a second worker while the first still holds it.
    pub fn handle_sync_result<T>(
        &self,
        queue: &WorkQueue<ResourceKey>,
        key: &ResourceKey,
        result: Result<T, ReconcilerError>,
        sink: &dyn ErrorSink,
    ) -> RetryDecision {
        let error = match result {
            Ok(_) => {
                queue.forget(key);
                return RetryDecision::Forgotten;
            }
            Err(error) => error,
        };

        let requeues = queue.num_requeues(key);
        if requeues < self.max_retries {
            let attempt = requeues + 1;
            let delay = queue.add_rate_limited(key.clone());
            let next_retry = chrono::Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            debug!(
                key = %key,
                attempt,
                delay_ms = delay.as_millis(),
                next_retry = %next_retry.to_rfc3339(),
                error = %error,
                "Error syncing HPA, requeueing"
            );
            metrics::increment_requeues();
            return RetryDecision::Requeued { attempt };
        }

        queue.forget(key);
        metrics::increment_dropped();
        sink.report(ControllerError::RetriesExhausted {
            key: key.clone(),
            attempts: requeues + 1,
            source: error,
        });
        RetryDecision::Dropped
    }
}

/// Broad class of a watch stream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: credentials or RBAC revoked
    Unauthorized,
    /// 410: resource version too old; a relist fixes it
    Expired,
    /// 429: API server throttling or storage reinitializing
    TooManyRequests,
    /// 404: the HPA API is not served
    NotFound,
    Other,
}

impl WatchErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "401",
            Self::Expired => "410",
            Self::TooManyRequests => "429",
            Self::NotFound => "404",
            Self::Other => "other",
        }
    }
}

/// Classify a watch error from its rendered message
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    // A plain-text 404 body surfaces as a serde error mentioning WatchFailed
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("code: 404")
        || error_string.contains("`404`")
        || error_string.contains("not found");
    let is_unauthorized = (error_string.contains("401") || error_string.contains("Unauthorized"))
        && !is_not_found;

    if is_unauthorized {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::TooManyRequests
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a watch stream error and wait before the watcher retries
///
/// `backoff_ms` grows on throttling, capped at `max_backoff_ms`, and is reset by the
/// watch loop on the next successful event.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff_ms: &AtomicU64,
    max_backoff_ms: u64,
    restart_delay: Duration,
) -> WatchErrorKind {
    let kind = classify_watch_error(error_string);
    match kind {
        WatchErrorKind::Unauthorized => {
            error!(
                error_type = kind.as_str(),
                error = error_string,
                "Watch authentication failed - RBAC may have been revoked or the token expired"
            );
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorKind::Expired => {
            warn!(error_type = kind.as_str(), "watch.error.resource_version_expired");
        }
        WatchErrorKind::TooManyRequests => {
            let current = backoff_ms.load(Ordering::Relaxed);
            warn!(
                error_type = kind.as_str(),
                backoff_ms = current,
                "API server throttling watch, backing off"
            );
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff_ms.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
        }
        WatchErrorKind::NotFound => {
            warn!(
                error_type = kind.as_str(),
                error = error_string,
                "HorizontalPodAutoscaler API not found (404)"
            );
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorKind::Other => {
            error!(error = error_string, "Watch stream error");
            tokio::time::sleep(restart_delay).await;
        }
    }
    kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backoff::ItemExponentialFailureRateLimiter;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct CollectingSink {
        errors: Mutex<Vec<ControllerError>>,
    }

    impl ErrorSink for CollectingSink {
        fn report(&self, error: ControllerError) {
            self.errors.lock().unwrap().push(error);
        }
    }

    fn queue() -> Arc<WorkQueue<ResourceKey>> {
        WorkQueue::new(
            "error-policy-test",
            Box::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(5),
                Duration::from_secs(1000),
            )),
        )
    }

    fn failure(key: &ResourceKey) -> Result<(), ReconcilerError> {
        Err(ReconcilerError::UpdateFailed {
            key: key.clone(),
            source: anyhow!("conflict"),
        })
    }

    #[tokio::test]
    async fn test_success_forgets_key() {
        let queue = queue();
        let sink = CollectingSink::default();
        let key = ResourceKey::new("prod", "web");
        let policy = RetryPolicy::new(15);

        policy.handle_sync_result(&queue, &key, failure(&key), &sink);
        assert_eq!(queue.num_requeues(&key), 1);

        let decision = policy.handle_sync_result(&queue, &key, Ok(()), &sink);
        assert_eq!(decision, RetryDecision::Forgotten);
        assert_eq!(queue.num_requeues(&key), 0);
    }

    #[tokio::test]
    async fn test_fifteen_requeues_then_drop() {
        let queue = queue();
        let sink = CollectingSink::default();
        let key = ResourceKey::new("prod", "web");
        let policy = RetryPolicy::new(15);

        for expected in 1..=15 {
            let decision = policy.handle_sync_result(&queue, &key, failure(&key), &sink);
            assert_eq!(decision, RetryDecision::Requeued { attempt: expected });
        }
        assert_eq!(queue.num_requeues(&key), 15);

        let decision = policy.handle_sync_result(&queue, &key, failure(&key), &sink);
        assert_eq!(decision, RetryDecision::Dropped);
        assert_eq!(queue.num_requeues(&key), 0);

        let errors = sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ControllerError::RetriesExhausted { attempts: 16, .. }
        ));
    }

    #[test]
    fn test_classify_watch_error() {
        assert_eq!(
            classify_watch_error("ErrorResponse { code: 401, reason: Unauthorized }"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::TooManyRequests
        );
        assert_eq!(
            classify_watch_error("WatchFailed: invalid type: integer `404`"),
            WatchErrorKind::NotFound
        );
        assert_eq!(classify_watch_error("connection reset"), WatchErrorKind::Other);
    }

    #[test]
    fn test_expired_resource_version_containing_404_digits() {
        assert_eq!(
            classify_watch_error("too old resource version: 14042 (14100)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("ErrorResponse { reason: NotFound, code: 404 }"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            classify_watch_error("Unauthorized: ObjectNotFound"),
            WatchErrorKind::NotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_doubles_backoff_up_to_max() {
        let backoff = AtomicU64::new(400);

        handle_watch_stream_error("429 TooManyRequests", &backoff, 1000, Duration::ZERO).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 800);

        handle_watch_stream_error("429 TooManyRequests", &backoff, 1000, Duration::ZERO).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 1000);
    }
}
