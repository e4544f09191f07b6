//! # Worker Pool
//!
//! Owns the work queue and drains it with a fixed number of worker tasks.
//!
//! Lifecycle of [`HpaController::run`]:
//! 1. wait for the resource cache to finish its initial list
//! 2. spawn the workers (and the periodic resync, if configured)
//! 3. on shutdown, stop the queue and join every worker
//!
//! A worker that panics outside a sync is reported right away and restarted
//! after [`WORKER_LOOP_PERIOD_MS`]; the key it was handling goes back on the queue.

use crate::config::ControllerConfig;
use crate::constants::{CACHE_SYNC_POLL_INTERVAL_MS, QUEUE_NAME, WORKER_LOOP_PERIOD_MS};
use crate::controller::backoff::default_controller_rate_limiter;
use crate::controller::cache::ResourceCache;
use crate::controller::error::ControllerError;
use crate::controller::key::ResourceKey;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::controller::router::EventRouter;
use crate::controller::updater::HpaUpdater;
use crate::observability::ErrorSink;
use crate::runtime::error_policy::{RetryDecision, RetryPolicy};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Everything a worker needs to process one key
#[derive(Clone)]
struct Worker {
    queue: Arc<WorkQueue<ResourceKey>>,
    reconciler: Reconciler,
    retry_policy: RetryPolicy,
    sink: Arc<dyn ErrorSink>,
}

impl Worker {
    /// Drain the queue until it shuts down, restarting after a panic
    async fn run(self, id: usize) {
        debug!(worker = id, "Worker started");
        loop {
            let drained = AssertUnwindSafe(async {
                while self.process_next_work_item().await.is_some() {}
            })
            .catch_unwind()
            .await;
            let Err(panic) = drained else {
                break;
            };

            let message = panic_message(panic.as_ref());
            error!(worker = id, panic = %message, "Worker panicked, restarting");
            self.sink
                .report(ControllerError::WorkerPanicked { worker: id, message });
            if self.queue.is_shutting_down() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(WORKER_LOOP_PERIOD_MS)).await;
        }
        debug!(worker = id, "Worker stopped");
    }

    /// Take one key off the queue and sync it
    ///
    /// The key is always marked done. If handling it panics, the key is handed
    /// back to the queue after the worker loop period and the panic is resumed.
    async fn process_next_work_item(&self) -> Option<RetryDecision> {
        let key = self.queue.get().await?;

        let handled = AssertUnwindSafe(self.process(&key)).catch_unwind().await;
        self.queue.done(&key);
        match handled {
            Ok(decision) => Some(decision),
            Err(panic) => {
                self.queue
                    .add_after(key, Duration::from_millis(WORKER_LOOP_PERIOD_MS));
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn process(&self, key: &ResourceKey) -> RetryDecision {
        let span = info_span!(
            "controller.sync",
            resource.namespace = key.namespace.as_str(),
            resource.name = key.name.as_str(),
        );
        let result = AssertUnwindSafe(self.reconciler.sync(key))
            .catch_unwind()
            .instrument(span)
            .await
            .unwrap_or_else(|panic| {
                Err(ReconcilerError::Panicked {
                    key: key.clone(),
                    message: panic_message(panic.as_ref()),
                })
            });

        self.retry_policy
            .handle_sync_result(&self.queue, key, result, self.sink.as_ref())
    }
}

/// The HPA annotation controller
pub struct HpaController {
    worker: Worker,
    cache: Arc<dyn ResourceCache>,
    router: Arc<EventRouter>,
    resync_period: Option<Duration>,
    cache_sync_timeout: Option<Duration>,
}

impl HpaController {
    /// Build the controller and its queue
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        cache: Arc<dyn ResourceCache>,
        updater: Arc<dyn HpaUpdater>,
        sink: Arc<dyn ErrorSink>,
        config: &ControllerConfig,
    ) -> Self {
        let queue = WorkQueue::new(
            QUEUE_NAME,
            Box::new(default_controller_rate_limiter::<ResourceKey>(config)),
        );
        let router = Arc::new(EventRouter::new(Arc::clone(&queue), Arc::clone(&sink)));
        Self {
            worker: Worker {
                queue,
                reconciler: Reconciler::new(Arc::clone(&cache), updater),
                retry_policy: RetryPolicy::new(config.max_retries),
                sink,
            },
            cache,
            router,
            resync_period: config.resync_period(),
            cache_sync_timeout: config.cache_sync_timeout(),
        }
    }

    /// Event handlers that feed the queue
    #[must_use]
    pub fn router(&self) -> Arc<EventRouter> {
        Arc::clone(&self.router)
    }

    #[must_use]
    pub fn queue(&self) -> Arc<WorkQueue<ResourceKey>> {
        Arc::clone(&self.worker.queue)
    }

    /// Take one key off the queue and sync it
    ///
    /// Returns `None` once the queue has been shut down.
    ///
    /// # Panics
    ///
    /// Resumes a panic raised while applying the retry policy, after the key
    /// has been marked done and scheduled again.
    pub async fn process_next_work_item(&self) -> Option<RetryDecision> {
        self.worker.process_next_work_item().await
    }

    /// Run `workers` worker loops until `shutdown` completes
    ///
    /// In-flight syncs are allowed to finish; keys still queued at shutdown are
    /// not processed.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::CacheSyncFailed`] if the cache does not finish its
    /// initial sync before `shutdown` completes or the configured timeout elapses.
    pub async fn run<F>(&self, workers: usize, shutdown: F) -> Result<(), ControllerError>
    where
        F: Future<Output = ()> + Send,
    {
        info!(workers, "Starting HPA annotation controller");
        tokio::pin!(shutdown);

        info!("Waiting for HPA cache to sync");
        let synced = tokio::select! {
            synced = self.wait_for_cache_sync() => synced,
            () = &mut shutdown => false,
        };
        if !synced {
            self.worker.queue.shut_down();
            error!("Failed to wait for caches to sync");
            info!("HPA annotation controller stopped");
            return Err(ControllerError::CacheSyncFailed);
        }
        info!("HPA cache synced");

        let mut tasks = JoinSet::new();
        for id in 0..workers {
            let worker = self.worker.clone();
            tasks.spawn(worker.run(id));
        }

        let resync = self.resync_period.map(|period| {
            info!(period_secs = period.as_secs(), "Periodic resync enabled");
            tokio::spawn(Arc::clone(&self.router).run_periodic_resync(Arc::clone(&self.cache), period))
        });

        shutdown.await;
        info!("Shutting down workers");
        self.worker.queue.shut_down();
        if let Some(resync) = resync {
            resync.abort();
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker task did not complete");
            }
        }

        info!("HPA annotation controller stopped");
        Ok(())
    }

    async fn wait_for_cache_sync(&self) -> bool {
        let poll = async {
            let mut interval =
                tokio::time::interval(Duration::from_millis(CACHE_SYNC_POLL_INTERVAL_MS));
            loop {
                interval.tick().await;
                if self.cache.has_synced() {
                    return;
                }
            }
        };
        match self.cache_sync_timeout {
            Some(timeout) => tokio::time::timeout(timeout, poll).await.is_ok(),
            None => {
                poll.await;
                true
            }
        }
    }
}

impl fmt::Debug for HpaController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HpaController")
            .field("queue", &self.worker.queue)
            .field("retry_policy", &self.worker.retry_policy)
            .field("resync_period", &self.resync_period)
            .field("cache_sync_timeout", &self.cache_sync_timeout)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
