//! HPA Annotation Controller Library
//!
//! Watches HorizontalPodAutoscalers and publishes their CPU and memory utilization
//! targets as `cpuTargetUtilization` / `memoryTargetValue` annotations.
//! Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use hpa_annotation_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod cli;
pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod prelude;
pub mod runtime;
