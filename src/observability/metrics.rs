//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `hpa_controller_syncs_total` - Total number of sync attempts
//! - `hpa_controller_sync_errors_total` - Total number of failed sync attempts
//! - `hpa_controller_sync_duration_seconds` - Duration of sync operations
//! - `hpa_controller_updates_total` - Total number of HPA writes issued
//! - `hpa_controller_requeues_total` - Total number of rate-limited requeues
//! - `hpa_controller_dropped_total` - Keys dropped after exhausting retries
//! - `hpa_controller_queue_adds_total{queue}` - Keys added to a work queue
//! - `hpa_controller_queue_depth{queue}` - Keys currently waiting in a work queue
//! - `hpa_controller_reported_errors_total{kind}` - Errors reported to the error sink

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SYNCS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("hpa_controller_syncs_total", "Total number of sync attempts")
        .expect("Failed to create SYNCS_TOTAL metric - this should never happen")
});

static SYNC_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hpa_controller_sync_errors_total",
        "Total number of failed sync attempts",
    )
    .expect("Failed to create SYNC_ERRORS_TOTAL metric - this should never happen")
});

static SYNC_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "hpa_controller_sync_duration_seconds",
            "Duration of sync operations in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create SYNC_DURATION metric - this should never happen")
});

static UPDATES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hpa_controller_updates_total",
        "Total number of HorizontalPodAutoscaler updates issued",
    )
    .expect("Failed to create UPDATES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hpa_controller_requeues_total",
        "Total number of keys requeued with rate limiting after a failed sync",
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static DROPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hpa_controller_dropped_total",
        "Total number of keys dropped out of the queue after exhausting retries",
    )
    .expect("Failed to create DROPPED_TOTAL metric - this should never happen")
});

static QUEUE_ADDS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "hpa_controller_queue_adds_total",
            "Total number of keys added to the work queue",
        ),
        &["queue"],
    )
    .expect("Failed to create QUEUE_ADDS_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "hpa_controller_queue_depth",
            "Number of keys waiting in the work queue",
        ),
        &["queue"],
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

static REPORTED_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "hpa_controller_reported_errors_total",
            "Total number of errors reported to the error sink by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create REPORTED_ERRORS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SYNCS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_DURATION.clone()))?;
    REGISTRY.register(Box::new(UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DROPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_ADDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(REPORTED_ERRORS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_syncs() {
    SYNCS_TOTAL.inc();
}

pub fn increment_sync_errors() {
    SYNC_ERRORS_TOTAL.inc();
}

pub fn observe_sync_duration(duration: f64) {
    SYNC_DURATION.observe(duration);
}

pub fn increment_updates() {
    UPDATES_TOTAL.inc();
}

pub fn increment_requeues() {
    REQUEUES_TOTAL.inc();
}

pub fn increment_dropped() {
    DROPPED_TOTAL.inc();
}

pub fn increment_queue_adds(queue: &str) {
    QUEUE_ADDS_TOTAL.with_label_values(&[queue]).inc();
}

pub fn set_queue_depth(queue: &str, depth: usize) {
    let depth = i64::try_from(depth).unwrap_or(i64::MAX);
    QUEUE_DEPTH.with_label_values(&[queue]).set(depth);
}

/// Increment the reported errors counter for an error kind
pub fn increment_reported_errors(kind: &str) {
    REPORTED_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_syncs() {
        let before = SYNCS_TOTAL.get();
        increment_syncs();
        assert!(SYNCS_TOTAL.get() > before);
    }

    #[test]
    fn test_increment_sync_errors() {
        let before = SYNC_ERRORS_TOTAL.get();
        increment_sync_errors();
        assert!(SYNC_ERRORS_TOTAL.get() > before);
    }

    #[test]
    fn test_observe_sync_duration() {
        let before = SYNC_DURATION.get_sample_count();
        observe_sync_duration(0.02);
        assert!(SYNC_DURATION.get_sample_count() > before);
    }

    #[test]
    fn test_increment_requeues_and_dropped() {
        let requeues = REQUEUES_TOTAL.get();
        let dropped = DROPPED_TOTAL.get();
        increment_requeues();
        increment_dropped();
        assert!(REQUEUES_TOTAL.get() > requeues);
        assert!(DROPPED_TOTAL.get() > dropped);
    }

    #[test]
    fn test_queue_metrics_are_labelled_by_queue() {
        let before = QUEUE_ADDS_TOTAL.with_label_values(&["metrics-test"]).get();
        increment_queue_adds("metrics-test");
        let after = QUEUE_ADDS_TOTAL.with_label_values(&["metrics-test"]).get();
        assert_eq!(after, before + 1u64);

        set_queue_depth("metrics-test", 7);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["metrics-test"]).get(), 7);
        set_queue_depth("metrics-test", 0);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["metrics-test"]).get(), 0);
    }

    #[test]
    fn test_increment_reported_errors() {
        let before = REPORTED_ERRORS_TOTAL
            .with_label_values(&["metrics_test_kind"])
            .get();
        increment_reported_errors("metrics_test_kind");
        let after = REPORTED_ERRORS_TOTAL
            .with_label_values(&["metrics_test_kind"])
            .get();
        assert_eq!(after, before + 1u64);
    }
}
