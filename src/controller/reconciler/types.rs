//! # Reconciler Types
//!
//! Core types for the reconciler: the reconciler context, its errors and outcomes.

use crate::controller::cache::ResourceCache;
use crate::controller::key::ResourceKey;
use crate::controller::updater::HpaUpdater;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to look up {key} in the cache: {source}")]
    CacheLookup {
        key: ResourceKey,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to update {key}: {source}")]
    UpdateFailed {
        key: ResourceKey,
        #[source]
        source: anyhow::Error,
    },
    #[error("sync of {key} panicked: {message}")]
    Panicked { key: ResourceKey, message: String },
}

/// What a successful sync did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The resource is gone; nothing to do
    NotFound,
    /// No CPU or memory utilization target; no write issued
    NoTargets,
    /// The resource was written back with this many target annotations
    Updated { annotations: usize },
}

/// Reconciler context shared by all workers
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) cache: Arc<dyn ResourceCache>,
    pub(crate) updater: Arc<dyn HpaUpdater>,
}

impl Reconciler {
    #[must_use]
    pub fn new(cache: Arc<dyn ResourceCache>, updater: Arc<dyn HpaUpdater>) -> Self {
        Self { cache, updater }
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("cache_synced", &self.cache.has_synced())
            .finish_non_exhaustive()
    }
}
