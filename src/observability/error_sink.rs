//! # Error Sink
//!
//! Process-wide destination for errors that are not returned to a caller:
//! malformed events, keys dropped after exhausting their retries, crashed workers.
//! One sink is built at startup and handed to every component that needs it.

use crate::controller::error::ControllerError;
use crate::observability::metrics;
use std::fmt;
use tracing::error;

/// Accepts errors that cannot be propagated to a caller
pub trait ErrorSink: Send + Sync + fmt::Debug {
    fn report(&self, error: ControllerError);
}

/// Logs reported errors and counts them by kind
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: ControllerError) {
        let kind = error.kind();
        metrics::increment_reported_errors(kind);
        error!(error.kind = kind, error = %error, "controller.error");
    }
}
