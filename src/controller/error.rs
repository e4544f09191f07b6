//! # Controller Errors
//!
//! Errors that are reported to the error sink or returned from the controller's run loop.

use crate::controller::key::{KeyError, ResourceKey};
use crate::controller::reconciler::ReconcilerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// An event carried an object no key could be derived from
    #[error("couldn't get key for object: {0}")]
    InvalidObject(#[from] KeyError),

    /// A key failed every allowed attempt and was dropped out of the queue
    #[error("dropping {key} out of the queue after {attempts} attempts: {source}")]
    RetriesExhausted {
        key: ResourceKey,
        attempts: u32,
        #[source]
        source: ReconcilerError,
    },

    /// A worker task terminated abnormally
    #[error("worker {worker} terminated abnormally: {message}")]
    WorkerPanicked { worker: usize, message: String },

    /// The resource cache never completed its initial sync
    #[error("failed to wait for caches to sync")]
    CacheSyncFailed,
}

impl ControllerError {
    /// Short, stable name used as a metrics label
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidObject(_) => "invalid_object",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::WorkerPanicked { .. } => "worker_panicked",
            Self::CacheSyncFailed => "cache_sync_failed",
        }
    }
}
