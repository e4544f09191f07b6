//! # Runtime
//!
//! Process-level wiring of the controller.
//!
//! - `error_policy`: retry decisions for failed syncs, watch error classification
//! - `initialization`: crypto provider, tracing, metrics server, Kubernetes client
//! - `watch_loop`: reflector-backed HPA watch feeding the event router
//! - `worker_pool`: the controller and its worker tasks

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
pub mod worker_pool;

pub use error_policy::{RetryDecision, RetryPolicy};
pub use worker_pool::HpaController;
