//! # Controller
//!
//! Core controller modules for the HPA Annotation Controller.
//!
//! - `backoff`: Rate limiters deciding when a failed key may be retried
//! - `cache`: Read-only view of the watched HPAs
//! - `error`: Errors reported to the error sink
//! - `key`: `namespace/name` resource keys
//! - `queue`: Deduplicating, rate-limited work queue
//! - `reconciler`: Core reconciliation logic
//! - `router`: Watch events to queue keys
//! - `server`: HTTP server for metrics and health checks
//! - `updater`: Writes HPAs back to the API server

pub mod backoff;
pub mod cache;
pub mod error;
pub mod key;
pub mod queue;
pub mod reconciler;
pub mod router;
pub mod server;
pub mod updater;
