//! # Observability
//!
//! Observability modules for metrics and error reporting.
//!
//! - `metrics`: Prometheus metrics collection
//! - `error_sink`: Destination for errors that have no caller to return to

pub mod error_sink;
pub mod metrics;

// Re-export for convenience
pub use error_sink::{ErrorSink, TracingErrorSink};
