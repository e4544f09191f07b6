//! Common test utilities for controller integration tests
//!
//! In-memory stand-ins for the watch cache, the API server and the error sink,
//! plus HPA fixtures built from JSON.

#![allow(dead_code, reason = "Not every test binary uses every helper")]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hpa_annotation_controller::prelude::*;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Watch cache backed by a map
#[derive(Debug, Default)]
pub struct FakeCache {
    objects: Mutex<HashMap<ResourceKey, Arc<HorizontalPodAutoscaler>>>,
    synced: AtomicBool,
}

impl FakeCache {
    /// A cache that reports its initial sync as complete
    pub fn synced() -> Arc<Self> {
        let cache = Arc::new(Self::default());
        cache.set_synced(true);
        cache
    }

    pub fn insert(&self, hpa: HorizontalPodAutoscaler) -> ResourceKey {
        let key = ResourceKey::from_meta(&hpa.metadata).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(key.clone(), Arc::new(hpa));
        key
    }

    pub fn get_cached(&self, key: &ResourceKey) -> Option<Arc<HorizontalPodAutoscaler>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }
}

impl ResourceCache for FakeCache {
    fn get(&self, key: &ResourceKey) -> Result<Option<Arc<HorizontalPodAutoscaler>>> {
        Ok(self.get_cached(key))
    }

    fn keys(&self) -> Vec<ResourceKey> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// Updater that records every write and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingUpdater {
    updates: Mutex<Vec<HorizontalPodAutoscaler>>,
    calls: AtomicU32,
    failures_remaining: AtomicU32,
    panic_next: AtomicBool,
}

impl RecordingUpdater {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` update calls
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Panic inside the next update call
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    /// Successful writes, in order
    pub fn updates(&self) -> Vec<HorizontalPodAutoscaler> {
        self.updates.lock().unwrap().clone()
    }

    /// Every call, successful or not
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HpaUpdater for RecordingUpdater {
    async fn update(&self, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("updater exploded");
        }
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("Operation cannot be fulfilled: the object has been modified"));
        }
        self.updates.lock().unwrap().push(hpa.clone());
        Ok(hpa.clone())
    }
}

/// Error sink that keeps everything reported to it
#[derive(Debug, Default)]
pub struct RecordingSink {
    errors: Mutex<Vec<ControllerError>>,
    panic_next: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Panic inside the next report instead of recording it
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.errors
            .lock()
            .unwrap()
            .iter()
            .map(ControllerError::kind)
            .collect()
    }

    pub fn take(&self) -> Vec<ControllerError> {
        std::mem::take(&mut *self.errors.lock().unwrap())
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, error: ControllerError) {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("error sink exploded while reporting {}", error.kind());
        }
        self.errors.lock().unwrap().push(error);
    }
}

/// Resource metric targeting an average utilization
pub fn resource_metric(resource: &str, utilization: i32) -> Value {
    json!({
        "type": "Resource",
        "resource": {
            "name": resource,
            "target": {"type": "Utilization", "averageUtilization": utilization}
        }
    })
}

/// HPA `namespace/name` with the given metrics and annotations
pub fn hpa(namespace: &str, name: &str, metrics: Value, annotations: Value) -> HorizontalPodAutoscaler {
    serde_json::from_value(json!({
        "apiVersion": "autoscaling/v2",
        "kind": "HorizontalPodAutoscaler",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "annotations": annotations,
        },
        "spec": {
            "minReplicas": 1,
            "maxReplicas": 10,
            "scaleTargetRef": {"apiVersion": "apps/v1", "kind": "Deployment", "name": name},
            "metrics": metrics,
        }
    }))
    .unwrap()
}

/// Annotation value on an HPA, if present
pub fn annotation<'a>(hpa: &'a HorizontalPodAutoscaler, key: &str) -> Option<&'a str> {
    hpa.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Controller wired to fresh fakes
pub struct Harness {
    pub cache: Arc<FakeCache>,
    pub updater: Arc<RecordingUpdater>,
    pub sink: Arc<RecordingSink>,
    pub controller: HpaController,
}

impl Harness {
    /// Must be called from within a tokio runtime
    pub fn new(config: &ControllerConfig) -> Self {
        let cache = FakeCache::synced();
        let updater = RecordingUpdater::new();
        let sink = RecordingSink::new();
        let controller = HpaController::new(
            Arc::clone(&cache) as Arc<dyn ResourceCache>,
            Arc::clone(&updater) as Arc<dyn HpaUpdater>,
            Arc::clone(&sink) as Arc<dyn ErrorSink>,
            config,
        );
        Self {
            cache,
            updater,
            sink,
            controller,
        }
    }
}
