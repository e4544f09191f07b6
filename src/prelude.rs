//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use hpa_annotation_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - The controller and its queue, keys and retry policy
//! - The seams a host process plugs into (cache, updater, error sink)
//! - Reconciler types and errors
//! - Config types

// Controller entry point
pub use crate::runtime::{HpaController, RetryDecision, RetryPolicy};

// Integration seams
pub use crate::controller::cache::{ReflectorCache, ResourceCache};
pub use crate::controller::updater::{HpaUpdater, KubeHpaUpdater};
pub use crate::observability::{ErrorSink, TracingErrorSink};

// Queue and keys
pub use crate::controller::backoff::{
    default_controller_rate_limiter, BucketRateLimiter, ItemExponentialFailureRateLimiter,
    MaxOfRateLimiter, RateLimiter,
};
pub use crate::controller::key::{KeyError, ResourceKey};
pub use crate::controller::queue::WorkQueue;
pub use crate::controller::router::EventRouter;

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{Reconciler, ReconcilerError, SyncOutcome};

// Config types
pub use crate::config::ControllerConfig;

// Common error types
pub use crate::controller::error::ControllerError;
