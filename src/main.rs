//! # HPA Annotation Controller
//!
//! A Kubernetes controller that copies the CPU and memory utilization targets of every
//! HorizontalPodAutoscaler into annotations on the same object.
//!
//! ## Overview
//!
//! For each HPA the controller computes:
//!
//! - `cpuTargetUtilization` from a resource metric on `cpu` with an average utilization target
//! - `memoryTargetValue` from a resource metric on `memory` with an average utilization target
//!
//! and writes them back so dashboards and tooling can read targets from annotations.
//!
//! ## Features
//!
//! - **Level-triggered**: every add or update enqueues the HPA; syncs are idempotent
//! - **Bounded retries**: failed syncs back off exponentially and are dropped after 15 retries
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::{Context, Result};
use clap::Parser;
use hpa_annotation_controller::cli::Cli;
use hpa_annotation_controller::config::ControllerConfig;
use hpa_annotation_controller::constants::{WATCH_BACKOFF_MAX_MS, WATCH_BACKOFF_START_MS};
use hpa_annotation_controller::controller::updater::KubeHpaUpdater;
use hpa_annotation_controller::observability::TracingErrorSink;
use hpa_annotation_controller::runtime::initialization::{
    init_tracing, initialize, install_crypto_provider,
};
use hpa_annotation_controller::runtime::watch_loop::{run_watch_loop, WatchBackoff};
use hpa_annotation_controller::runtime::HpaController;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ControllerConfig::from_env();
    cli.apply(&mut config);

    // Configure rustls crypto provider FIRST, before any other operations
    install_crypto_provider()?;
    init_tracing(&config.log_format)?;

    info!("Starting HPA Annotation Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        config = %serde_json::to_string(&config).context("Failed to serialize configuration")?,
        "Loaded configuration"
    );

    let init = initialize(&config).await?;

    let controller = HpaController::new(
        Arc::new(init.cache.clone()),
        Arc::new(KubeHpaUpdater::new(init.client.clone())),
        Arc::new(TracingErrorSink),
        &config,
    );

    let watch = tokio::spawn(run_watch_loop(
        init.hpas,
        init.writer,
        controller.router(),
        init.cache.synced_flag(),
        WatchBackoff {
            start_ms: WATCH_BACKOFF_START_MS,
            max_ms: WATCH_BACKOFF_MAX_MS,
        },
    ));

    let server_state = Arc::clone(&init.server_state);
    let result = controller
        .run(config.workers, async move {
            shutdown_signal().await;
            // Fail readiness while in-flight syncs drain
            server_state.shutting_down.store(true, Ordering::Relaxed);
        })
        .await;

    watch.abort();
    init.server_handle.abort();
    result.context("Controller failed")?;

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating graceful shutdown..."),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
