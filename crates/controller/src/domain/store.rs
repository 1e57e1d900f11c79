//! Narrow interfaces onto the cluster object store.
//!
//! Reconcilers only see these traits; the kube-backed implementations live in
//! `infrastructure::k8s` and in-memory fakes in `domain::mock`.

use core::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;

use crate::domain::key::ObjectKey;

/// Classified failures of calls against the object store.
#[derive(Debug, derive_more::Display, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[display("{kind} {key} not found")]
    NotFound { kind: String, key: String },
    #[display("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: String },
    #[display("write conflict on {kind} {key}")]
    Conflict { kind: String, key: String },
    #[display("object is missing required metadata: {message}")]
    InvalidObject { message: String },
    #[display("API request failed: {message}")]
    Api { message: String },
}

impl Error for StoreError {}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Pod operations used by the pod lifecycle manager.
#[async_trait]
pub trait PodStore: Send + Sync {
    /// Fresh, uncached list of pods in `namespace` matching `label_selector`.
    async fn list(&self, namespace: &str, label_selector: &str)
        -> Result<Vec<Pod>, Report<StoreError>>;

    /// Creates `pod` in `namespace` and returns the stored object.
    async fn create(&self, namespace: &str, pod: &Pod) -> Result<Pod, Report<StoreError>>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Report<StoreError>>;
}

/// Typed read/write access to custom resources, bypassing the cache.
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Latest version of the object, or `None` if it does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Report<StoreError>>;

    /// Creates `obj` in the namespace recorded in its metadata.
    async fn create(&self, obj: &K) -> Result<K, Report<StoreError>>;

    /// Writes the status sub-resource of `obj`. The write carries the object's
    /// resource version, so a concurrent writer causes [`StoreError::Conflict`].
    async fn replace_status(&self, obj: &K) -> Result<K, Report<StoreError>>;
}

/// Read-through cache of watched objects (the lister).
pub trait ObjectCache<K>: Send + Sync {
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>>;
}
