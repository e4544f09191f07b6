//! # Resource Keys
//!
//! `namespace/name` identifiers used for queue deduplication and cache lookups.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while building or parsing a [`ResourceKey`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("unexpected key format: {0:?}")]
    InvalidFormat(String),
    #[error("object has no name (namespace: {namespace:?})")]
    MissingName { namespace: Option<String> },
}

/// Identity of one HorizontalPodAutoscaler
///
/// Encoded as `namespace/name`, or just `name` for cluster-scoped objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the key of an object from its metadata
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::MissingName`] when the object has no name.
    pub fn from_meta(meta: &ObjectMeta) -> Result<Self, KeyError> {
        match meta.name.as_deref() {
            Some(name) if !name.is_empty() => Ok(Self::new(
                meta.namespace.clone().unwrap_or_default(),
                name,
            )),
            _ => Err(KeyError::MissingName {
                namespace: meta.namespace.clone(),
            }),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl FromStr for ResourceKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let key = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => Self::new("", name),
            (Some(namespace), Some(name), None) => Self::new(namespace, name),
            _ => return Err(KeyError::InvalidFormat(s.to_string())),
        };
        if key.name.is_empty() {
            return Err(KeyError::InvalidFormat(s.to_string()));
        }
        Ok(key)
    }
}
