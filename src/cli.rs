//! # Command Line
//!
//! Flags for the controller binary. Every flag overrides the matching
//! environment variable; unset flags leave the environment value in place.
//!
//! ```bash
//! hpa-annotation-controller --workers 10 --namespace prod --resync-period-secs 300
//! ```

use crate::config::ControllerConfig;
use clap::{Parser, ValueEnum};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// Publishes HorizontalPodAutoscaler CPU and memory targets as annotations
#[derive(Debug, Parser)]
#[command(name = "hpa-annotation-controller", version, long_about = None)]
pub struct Cli {
    /// Number of concurrent worker loops [env: WORKERS]
    #[arg(long)]
    pub workers: Option<usize>,

    /// Only watch HorizontalPodAutoscalers in this namespace [env: WATCH_NAMESPACE]
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Port of the metrics and probe server [env: METRICS_PORT]
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Re-enqueue every cached HPA this often, 0 disables [env: RESYNC_PERIOD_SECS]
    #[arg(long)]
    pub resync_period_secs: Option<u64>,

    /// Log output format [env: LOG_FORMAT]
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Apply the flags that were given on top of `config`
    pub fn apply(&self, config: &mut ControllerConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(namespace) = &self.namespace {
            config.watch_namespace = Some(namespace.clone());
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(period) = self.resync_period_secs {
            config.resync_period_secs = period;
        }
        if let Some(format) = self.log_format {
            config.log_format = format.as_str().to_string();
        }
    }
}
