//! # Watch Loop
//!
//! Watches HorizontalPodAutoscalers, keeps the reflector store current and feeds
//! the event router.

use crate::constants::WATCH_RESTART_DELAY_SECS;
use crate::controller::router::EventRouter;
use crate::runtime::error_policy::handle_watch_stream_error;
use futures::StreamExt;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::Api;
use kube_runtime::reflector::{self, store::Writer};
use kube_runtime::watcher::{self, Event};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Watch backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchBackoff {
    pub start_ms: u64,
    pub max_ms: u64,
}

/// Run the watch until the stream ends
///
/// Objects from a (re)list are routed only once the list completes, when the
/// store has been swapped to the new listing. The first completed list raises
/// `synced`.
#[tracing::instrument(name = "controller.watch", skip_all)]
pub async fn run_watch_loop(
    api: Api<HorizontalPodAutoscaler>,
    writer: Writer<HorizontalPodAutoscaler>,
    router: Arc<EventRouter>,
    synced: Arc<AtomicBool>,
    backoff: WatchBackoff,
) {
    info!("Starting HPA watch...");

    let backoff_ms = AtomicU64::new(backoff.start_ms);
    let restart_delay = Duration::from_secs(WATCH_RESTART_DELAY_SECS);
    let mut listing: Vec<HorizontalPodAutoscaler> = Vec::new();
    let mut stream = reflector::reflector(writer, watcher::watcher(api, watcher::Config::default())).boxed();

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => {
                backoff_ms.store(backoff.start_ms, Ordering::Relaxed);
                event
            }
            Err(e) => {
                let error_string = format!("{e:?}");
                handle_watch_stream_error(&error_string, &backoff_ms, backoff.max_ms, restart_delay)
                    .await;
                continue;
            }
        };

        match event {
            Event::Apply(hpa) => router.on_add(&hpa),
            Event::Delete(hpa) => debug!(
                resource.namespace = hpa.metadata.namespace.as_deref().unwrap_or_default(),
                resource.name = hpa.metadata.name.as_deref().unwrap_or_default(),
                "watch.event.deleted"
            ),
            Event::Init => {
                debug!("watch.relist.started");
                listing.clear();
            }
            Event::InitApply(hpa) => listing.push(hpa),
            Event::InitDone => {
                info!(resources = listing.len(), "watch.relist.completed");
                synced.store(true, Ordering::Release);
                for hpa in listing.drain(..) {
                    router.on_add(&hpa);
                }
            }
        }
    }

    info!("HPA watch stream ended");
}
