//! # Resource Cache
//!
//! Read-only local view of the watched HorizontalPodAutoscalers.
//!
//! The cache hands out shared (`Arc`) copies; callers clone before mutating.

use crate::controller::key::ResourceKey;
use anyhow::Result;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube_runtime::reflector::{ObjectRef, Store};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lookup side of the watch cache
pub trait ResourceCache: Send + Sync {
    /// Last observed state of `key`, `None` if it is not (or no longer) known
    fn get(&self, key: &ResourceKey) -> Result<Option<Arc<HorizontalPodAutoscaler>>>;

    /// Keys of every object currently in the cache
    fn keys(&self) -> Vec<ResourceKey>;

    /// Whether the initial list has been fully loaded
    fn has_synced(&self) -> bool;
}

/// [`ResourceCache`] backed by a `kube_runtime` reflector store
///
/// The sync flag is raised by the watch loop once the watcher reports its
/// initial listing as complete.
#[derive(Clone)]
pub struct ReflectorCache {
    store: Store<HorizontalPodAutoscaler>,
    synced: Arc<AtomicBool>,
}

impl ReflectorCache {
    #[must_use]
    pub fn new(store: Store<HorizontalPodAutoscaler>) -> Self {
        Self {
            store,
            synced: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag shared with the watch loop (and the readiness probe)
    #[must_use]
    pub fn synced_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.synced)
    }
}

impl fmt::Debug for ReflectorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectorCache")
            .field("synced", &self.synced.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ResourceCache for ReflectorCache {
    fn get(&self, key: &ResourceKey) -> Result<Option<Arc<HorizontalPodAutoscaler>>> {
        let object_ref = ObjectRef::new(&key.name).within(&key.namespace);
        Ok(self.store.get(&object_ref))
    }

    fn keys(&self) -> Vec<ResourceKey> {
        self.store
            .state()
            .iter()
            .filter_map(|hpa| ResourceKey::from_meta(&hpa.metadata).ok())
            .collect()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}
