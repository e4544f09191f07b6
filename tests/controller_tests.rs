//! # Controller Tests
//!
//! Retry policy and the worker pool driven end to end against in-memory fakes.
//! Tests that involve backoff run on a paused clock.

mod common;

use common::{annotation, hpa, resource_metric, Harness};
use hpa_annotation_controller::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test(start_paused = true)]
async fn test_key_is_dropped_after_fifteen_retries() {
    let harness = Harness::new(&ControllerConfig::default());
    let key = harness.cache.insert(hpa(
        "prod",
        "web",
        json!([resource_metric("cpu", 80)]),
        json!({}),
    ));
    harness.updater.fail_next(u32::MAX);
    let queue = harness.controller.queue();
    queue.add(key.clone());

    for attempt in 1..=15 {
        assert_eq!(
            harness.controller.process_next_work_item().await,
            Some(RetryDecision::Requeued { attempt })
        );
    }
    assert_eq!(
        harness.controller.process_next_work_item().await,
        Some(RetryDecision::Dropped)
    );

    assert_eq!(harness.updater.calls(), 16);
    assert_eq!(queue.num_requeues(&key), 0);
    assert_eq!(harness.sink.kinds(), vec!["retries_exhausted"]);

    // No 16th requeue is ever scheduled
    tokio::time::sleep(Duration::from_secs(2_000)).await;
    assert!(queue.is_empty());
    assert_eq!(harness.updater.calls(), 16);
}

#[tokio::test(start_paused = true)]
async fn test_success_after_failures_resets_retries() {
    let harness = Harness::new(&ControllerConfig::default());
    let key = harness.cache.insert(hpa(
        "prod",
        "web",
        json!([resource_metric("memory", 60)]),
        json!({}),
    ));
    harness.updater.fail_next(2);
    let queue = harness.controller.queue();
    queue.add(key.clone());

    assert_eq!(
        harness.controller.process_next_work_item().await,
        Some(RetryDecision::Requeued { attempt: 1 })
    );
    assert_eq!(
        harness.controller.process_next_work_item().await,
        Some(RetryDecision::Requeued { attempt: 2 })
    );
    assert_eq!(
        harness.controller.process_next_work_item().await,
        Some(RetryDecision::Forgotten)
    );

    assert_eq!(queue.num_requeues(&key), 0);
    assert_eq!(
        annotation(&harness.updater.updates()[0], "memoryTargetValue"),
        Some("60")
    );
    assert!(harness.sink.kinds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_sync_is_retried() {
    let harness = Harness::new(&ControllerConfig::default());
    let key = harness.cache.insert(hpa(
        "prod",
        "web",
        json!([resource_metric("cpu", 80)]),
        json!({}),
    ));
    harness.updater.panic_next();
    harness.controller.queue().add(key);

    assert_eq!(
        harness.controller.process_next_work_item().await,
        Some(RetryDecision::Requeued { attempt: 1 })
    );
    assert_eq!(
        harness.controller.process_next_work_item().await,
        Some(RetryDecision::Forgotten)
    );
    assert_eq!(harness.updater.updates().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_worker_panic_outside_sync_is_reported_and_recovered() {
    let config = ControllerConfig {
        max_retries: 0,
        ..ControllerConfig::default()
    };
    let harness = Harness::new(&config);
    let web = hpa("prod", "web", json!([resource_metric("cpu", 80)]), json!({}));
    let key = harness.cache.insert(web.clone());
    // The first failure is dropped at once, and reporting that drop panics
    harness.updater.fail_next(1);
    harness.sink.panic_next();
    let router = harness.controller.router();
    let updater = Arc::clone(&harness.updater);
    let sink = Arc::clone(&harness.sink);
    let controller = Arc::new(harness.controller);

    let (stop, stopped) = oneshot::channel::<()>();
    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .run(1, async {
                    let _ = stopped.await;
                })
                .await
        })
    };

    router.on_add(&web);
    wait_for(|| sink.kinds() == vec!["worker_panicked"]).await;

    // The key is handed out again and the restarted worker syncs it
    wait_for(|| updater.updates().len() == 1).await;
    assert_eq!(updater.calls(), 2);
    assert_eq!(
        annotation(&updater.updates()[0], "cpuTargetUtilization"),
        Some("80")
    );

    // Later events for the same key still get through
    router.on_add(&web);
    wait_for(|| updater.updates().len() == 2).await;
    assert_eq!(controller.queue().num_requeues(&key), 0);

    stop.send(()).unwrap();
    assert!(run.await.unwrap().is_ok());
    assert_eq!(sink.kinds(), vec!["worker_panicked"]);
}

#[tokio::test(start_paused = true)]
async fn test_run_waits_for_sync_then_processes_events() {
    let harness = Harness::new(&ControllerConfig::default());
    harness.cache.set_synced(false);
    let router = harness.controller.router();
    let updater = Arc::clone(&harness.updater);
    let cache = Arc::clone(&harness.cache);
    let sink = Arc::clone(&harness.sink);
    let controller = Arc::new(harness.controller);

    let (stop, stopped) = oneshot::channel::<()>();
    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .run(2, async {
                    let _ = stopped.await;
                })
                .await
        })
    };

    let web = hpa("prod", "web", json!([resource_metric("cpu", 80)]), json!({}));
    cache.insert(web.clone());
    router.on_add(&web);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(updater.calls(), 0, "no sync before the cache has synced");

    cache.set_synced(true);
    wait_for(|| updater.updates().len() == 1).await;
    assert_eq!(
        annotation(&updater.updates()[0], "cpuTargetUtilization"),
        Some("80")
    );

    let nameless: k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler =
        serde_json::from_value(json!({
            "apiVersion": "autoscaling/v2",
            "kind": "HorizontalPodAutoscaler",
            "metadata": {"namespace": "prod"}
        }))
        .unwrap();
    router.on_add(&nameless);
    assert_eq!(sink.kinds(), vec!["invalid_object"]);

    stop.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert!(controller.queue().is_shutting_down());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_cache_sync_fails() {
    let harness = Harness::new(&ControllerConfig::default());
    harness.cache.set_synced(false);

    let result = harness.controller.run(3, async {}).await;

    assert!(matches!(result, Err(ControllerError::CacheSyncFailed)));
    assert_eq!(harness.updater.calls(), 0);
    assert!(harness.controller.queue().is_shutting_down());
    assert_eq!(harness.sink.kinds(), Vec::<&str>::new());
}

#[tokio::test(start_paused = true)]
async fn test_cache_sync_timeout() {
    let config = ControllerConfig {
        cache_sync_timeout_secs: 2,
        ..ControllerConfig::default()
    };
    let harness = Harness::new(&config);
    harness.cache.set_synced(false);

    let result = harness
        .controller
        .run(1, std::future::pending::<()>())
        .await;

    assert!(matches!(result, Err(ControllerError::CacheSyncFailed)));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_resync_requeues_cached_hpas() {
    let config = ControllerConfig {
        resync_period_secs: 1,
        ..ControllerConfig::default()
    };
    let harness = Harness::new(&config);
    harness.cache.insert(hpa(
        "prod",
        "web",
        json!([resource_metric("cpu", 80)]),
        json!({}),
    ));
    let updater = Arc::clone(&harness.updater);
    let controller = Arc::new(harness.controller);

    let (stop, stopped) = oneshot::channel::<()>();
    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .run(1, async {
                    let _ = stopped.await;
                })
                .await
        })
    };

    // Nothing was routed; only the resync can have enqueued the HPA
    wait_for(|| updater.updates().len() >= 2).await;

    stop.send(()).unwrap();
    assert!(run.await.unwrap().is_ok());
}
