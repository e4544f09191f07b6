//! # Sync
//!
//! Idempotently brings one HPA's annotations in line with its metric targets.

use crate::controller::key::ResourceKey;
use crate::controller::reconciler::annotations::{merge_annotations, target_annotations};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError, SyncOutcome};
use crate::observability::metrics;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use std::time::Instant;
use tracing::debug;

impl Reconciler {
    /// Reconcile the HPA identified by `key`
    ///
    /// A key that is no longer in the cache has been deleted and counts as success.
    /// Whenever at least one target annotation is computed the full object is written
    /// back, even if the annotation values did not change.
    ///
    /// # Errors
    ///
    /// Returns an error when the cache lookup or the update fails; the caller retries.
    pub async fn sync(&self, key: &ResourceKey) -> Result<SyncOutcome, ReconcilerError> {
        let start = Instant::now();
        metrics::increment_syncs();

        let result = self.sync_hpa(key).await;

        let duration = start.elapsed();
        metrics::observe_sync_duration(duration.as_secs_f64());
        match &result {
            Ok(outcome) => debug!(
                key = %key,
                outcome = ?outcome,
                duration_ms = duration.as_millis(),
                "Finished syncing HPA"
            ),
            Err(e) => {
                metrics::increment_sync_errors();
                debug!(key = %key, error = %e, duration_ms = duration.as_millis(), "Failed syncing HPA");
            }
        }
        result
    }

    async fn sync_hpa(&self, key: &ResourceKey) -> Result<SyncOutcome, ReconcilerError> {
        let cached = self
            .cache
            .get(key)
            .map_err(|source| ReconcilerError::CacheLookup {
                key: key.clone(),
                source,
            })?;

        let Some(cached) = cached else {
            debug!(key = %key, "HPA has been deleted");
            return Ok(SyncOutcome::NotFound);
        };

        let annotations = target_annotations(cached.spec.as_ref());
        if annotations.is_empty() {
            return Ok(SyncOutcome::NoTargets);
        }

        // The cached object is shared with the watch cache; only ever mutate a copy
        let mut hpa = HorizontalPodAutoscaler::clone(&cached);
        merge_annotations(&mut hpa.metadata, &annotations);

        self.updater
            .update(&hpa)
            .await
            .map_err(|source| ReconcilerError::UpdateFailed {
                key: key.clone(),
                source,
            })?;
        metrics::increment_updates();

        Ok(SyncOutcome::Updated {
            annotations: annotations.len(),
        })
    }
}
