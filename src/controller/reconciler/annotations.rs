//! # Target Annotations
//!
//! Derives the presentation annotations from an HPA's metric targets.

use crate::constants::{
    CPU_TARGET_UTILIZATION_ANNOTATION, MEMORY_TARGET_VALUE_ANNOTATION, RESOURCE_CPU,
    RESOURCE_MEMORY,
};
use k8s_openapi::api::autoscaling::v2::{HorizontalPodAutoscalerSpec, MetricSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Well-known resource a resource metric refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Cpu,
    Memory,
    Other(String),
}

impl From<&str> for ResourceKind {
    fn from(name: &str) -> Self {
        match name {
            RESOURCE_CPU => Self::Cpu,
            RESOURCE_MEMORY => Self::Memory,
            other => Self::Other(other.to_string()),
        }
    }
}

/// The part of a metric spec this controller cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricKind {
    Resource {
        resource: ResourceKind,
        average_utilization: Option<i32>,
    },
    /// Pods, object, external and container-resource metrics
    Other,
}

impl From<&MetricSpec> for MetricKind {
    fn from(metric: &MetricSpec) -> Self {
        match &metric.resource {
            Some(source) => Self::Resource {
                resource: ResourceKind::from(source.name.as_str()),
                average_utilization: source.target.average_utilization,
            },
            None => Self::Other,
        }
    }
}

impl MetricKind {
    /// Annotation key and value this metric contributes, if any
    fn annotation(&self) -> Option<(&'static str, String)> {
        let Self::Resource {
            resource,
            average_utilization: Some(utilization),
        } = self
        else {
            return None;
        };
        match resource {
            ResourceKind::Cpu => Some((CPU_TARGET_UTILIZATION_ANNOTATION, utilization.to_string())),
            ResourceKind::Memory => Some((MEMORY_TARGET_VALUE_ANNOTATION, utilization.to_string())),
            ResourceKind::Other(_) => None,
        }
    }
}

/// Compute the target annotations for an HPA spec
///
/// Later metrics for the same resource overwrite earlier ones. Returns an empty
/// map when the spec has no metrics or none of them target CPU or memory
/// utilization.
#[must_use]
pub fn target_annotations(spec: Option<&HorizontalPodAutoscalerSpec>) -> BTreeMap<String, String> {
    spec.and_then(|spec| spec.metrics.as_deref())
        .unwrap_or_default()
        .iter()
        .filter_map(|metric| MetricKind::from(metric).annotation())
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Merge `computed` into the object's annotations
///
/// Creates the map if needed; existing keys not in `computed` are left untouched.
pub fn merge_annotations(meta: &mut ObjectMeta, computed: &BTreeMap<String, String>) {
    if computed.is_empty() {
        return;
    }
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .extend(computed.iter().map(|(k, v)| (k.clone(), v.clone())));
}
