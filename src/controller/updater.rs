//! # HPA Updater
//!
//! Writes a modified HorizontalPodAutoscaler back to the API server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::{Api, PostParams};
use kube::Client;
use std::fmt;

/// Remote mutation endpoint for HorizontalPodAutoscalers
#[async_trait]
pub trait HpaUpdater: Send + Sync {
    /// Replace the stored object with `hpa` (full replace, not a patch)
    ///
    /// Conflicting concurrent writes surface as errors.
    async fn update(&self, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler>;
}

/// [`HpaUpdater`] that issues a `PUT` through the Kubernetes API
#[derive(Clone)]
pub struct KubeHpaUpdater {
    client: Client,
}

impl KubeHpaUpdater {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl fmt::Debug for KubeHpaUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeHpaUpdater").finish_non_exhaustive()
    }
}

#[async_trait]
impl HpaUpdater for KubeHpaUpdater {
    async fn update(&self, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler> {
        let namespace = hpa
            .metadata
            .namespace
            .as_deref()
            .context("HorizontalPodAutoscaler has no namespace")?;
        let name = hpa
            .metadata
            .name
            .as_deref()
            .context("HorizontalPodAutoscaler has no name")?;

        let api: Api<HorizontalPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), hpa)
            .await
            .with_context(|| format!("Failed to update HorizontalPodAutoscaler {namespace}/{name}"))
    }
}
