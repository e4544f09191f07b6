//! # Event Router
//!
//! Turns watch notifications into queue keys.
//!
//! Routing is level-triggered: an update enqueues the new object's key without
//! looking at what changed. Deletions are not routed; a sync of a key that has
//! left the cache succeeds without doing anything.

use crate::controller::cache::ResourceCache;
use crate::controller::error::ControllerError;
use crate::controller::key::ResourceKey;
use crate::controller::queue::WorkQueue;
use crate::observability::ErrorSink;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::Resource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct EventRouter {
    queue: Arc<WorkQueue<ResourceKey>>,
    sink: Arc<dyn ErrorSink>,
}

impl EventRouter {
    #[must_use]
    pub fn new(queue: Arc<WorkQueue<ResourceKey>>, sink: Arc<dyn ErrorSink>) -> Self {
        Self { queue, sink }
    }

    pub fn on_add(&self, hpa: &HorizontalPodAutoscaler) {
        self.enqueue(hpa);
    }

    /// The previous state is accepted for symmetry with watch events but not inspected
    pub fn on_update(
        &self,
        _old: Option<&HorizontalPodAutoscaler>,
        new: &HorizontalPodAutoscaler,
    ) {
        self.enqueue(new);
    }

    fn enqueue<R: Resource>(&self, object: &R) {
        match ResourceKey::from_meta(object.meta()) {
            Ok(key) => {
                trace!(key = %key, "Enqueueing HPA");
                self.queue.add(key);
            }
            Err(e) => self.sink.report(ControllerError::from(e)),
        }
    }

    /// Re-enqueue every key currently in `cache`
    ///
    /// Returns how many keys were offered to the queue.
    pub fn resync(&self, cache: &dyn ResourceCache) -> usize {
        let keys = cache.keys();
        let count = keys.len();
        for key in keys {
            self.queue.add(key);
        }
        count
    }

    /// Call [`resync`](Self::resync) every `period` until the queue shuts down
    pub async fn run_periodic_resync(self: Arc<Self>, cache: Arc<dyn ResourceCache>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial list already enqueued everything
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self.queue.is_shutting_down() {
                break;
            }
            let count = self.resync(cache.as_ref());
            debug!(keys = count, period_secs = period.as_secs(), "Resynced HPAs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backoff::BucketRateLimiter;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct CollectingSink {
        errors: Mutex<Vec<String>>,
    }

    impl ErrorSink for CollectingSink {
        fn report(&self, error: ControllerError) {
            self.errors.lock().unwrap().push(error.kind().to_string());
        }
    }

    fn hpa(metadata: serde_json::Value) -> HorizontalPodAutoscaler {
        serde_json::from_value(json!({
            "apiVersion": "autoscaling/v2",
            "kind": "HorizontalPodAutoscaler",
            "metadata": metadata,
        }))
        .unwrap()
    }

    fn router() -> (EventRouter, Arc<WorkQueue<ResourceKey>>, Arc<CollectingSink>) {
        let queue = WorkQueue::new("router-test", Box::new(BucketRateLimiter::new(10.0, 100)));
        let sink = Arc::new(CollectingSink::default());
        let router = EventRouter::new(Arc::clone(&queue), Arc::clone(&sink) as Arc<dyn ErrorSink>);
        (router, queue, sink)
    }

    #[tokio::test]
    async fn test_add_and_update_enqueue_once() {
        let (router, queue, sink) = router();
        let object = hpa(json!({"name": "web", "namespace": "prod"}));

        router.on_add(&object);
        router.on_update(Some(&object), &object);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some(ResourceKey::new("prod", "web")));
        assert!(sink.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_object_without_name_is_reported() {
        let (router, queue, sink) = router();

        router.on_add(&hpa(json!({"namespace": "prod"})));

        assert!(queue.is_empty());
        assert_eq!(*sink.errors.lock().unwrap(), vec!["invalid_object".to_string()]);
    }
}
