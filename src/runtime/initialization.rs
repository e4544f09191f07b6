//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_LOG_FILTER, SERVER_POLL_INTERVAL_MS, SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::cache::ReflectorCache;
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use anyhow::{anyhow, bail, Context, Result};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::{api::Api, Client};
use kube_runtime::reflector::{self, store::Writer};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the watched HorizontalPodAutoscalers
    pub hpas: Api<HorizontalPodAutoscaler>,
    /// Read side of the watch cache
    pub cache: ReflectorCache,
    /// Write side of the watch cache, consumed by the watch loop
    pub writer: Writer<HorizontalPodAutoscaler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Metrics and probe server task
    pub server_handle: JoinHandle<()>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("cache", &self.cache)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Install ring as the process-wide rustls crypto provider
///
/// Must run before anything opens a TLS connection.
///
/// # Errors
///
/// Returns an error if a different provider was already installed.
pub fn install_crypto_provider() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        bail!("Failed to install rustls crypto provider");
    }
    Ok(())
}

/// Set up the global tracing subscriber
///
/// `RUST_LOG` overrides the default filter. `log_format` selects `json` or plain text output.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing(log_format: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let result = if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialize tracing subscriber: {e}"))
}

/// Initialize the controller runtime
///
/// This function handles:
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reflector store setup for the watched namespace(s)
///
/// The crypto provider and tracing must already be installed.
///
/// # Errors
///
/// Returns an error if metrics cannot be registered, the server fails to start or
/// no Kubernetes client can be built.
pub async fn initialize(config: &ControllerConfig) -> Result<InitializationResult> {
    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let (store, writer) = reflector::store();
    let cache = ReflectorCache::new(store);
    let server_state = Arc::new(ServerState::new(cache.synced_flag()));

    // Start HTTP server for metrics and probes
    let server_state_clone = Arc::clone(&server_state);
    let port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let hpas: Api<HorizontalPodAutoscaler> = match config.watch_namespace.as_deref() {
        Some(namespace) => {
            info!(namespace, "Watching HorizontalPodAutoscalers in a single namespace");
            Api::namespaced(client.clone(), namespace)
        }
        None => {
            info!("Watching HorizontalPodAutoscalers in all namespaces");
            Api::all(client.clone())
        }
    };

    Ok(InitializationResult {
        client,
        hpas,
        cache,
        writer,
        server_state,
        server_handle,
    })
}

/// Wait for the HTTP server to bind its port
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            bail!("HTTP server failed to start");
        }

        if server_state.is_listening.load(Ordering::Acquire) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            bail!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            );
        }

        tokio::time::sleep(poll_interval).await;
    }
}
