//! # Reconciler
//!
//! Core reconciliation logic for HorizontalPodAutoscaler resources.
//!
//! ## Reconciliation Flow
//!
//! 1. Look up the HPA in the watch cache (missing means deleted, nothing to do)
//! 2. Derive `cpuTargetUtilization` / `memoryTargetValue` from its resource metrics
//! 3. Merge them into a private copy of the object's annotations
//! 4. Replace the object through the API server

pub mod annotations;
pub mod sync;
pub mod types;

// Re-export public API
pub use annotations::{merge_annotations, target_annotations, MetricKind, ResourceKind};
pub use types::{Reconciler, ReconcilerError, SyncOutcome};
