//! `kube::Api` adapters for the store traits.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::NamespaceResourceScope;
use kube::api::DeleteParams;
use kube::api::ListParams;
use kube::api::PostParams;
use kube::Api;
use kube::Client;
use kube::Resource;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::classify_api_error;
use crate::domain::key::ObjectKey;
use crate::domain::store::PodStore;
use crate::domain::store::ResourceStore;
use crate::domain::store::StoreError;

/// Pod store talking straight to the API server, bypassing any cache.
#[derive(Clone)]
pub struct KubePodStore {
    client: Client,
}

impl KubePodStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl PodStore for KubePodStore {
    async fn list(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Pod>, Report<StoreError>> {
        let params = ListParams::default().labels(label_selector);
        self.api(namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| classify_api_error(e, "Pod", &format!("{namespace}/{label_selector}")))
    }

    async fn create(&self, namespace: &str, pod: &Pod) -> Result<Pod, Report<StoreError>> {
        self.api(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| classify_api_error(e, "Pod", &format!("{namespace}/{}", pod.name_any())))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Report<StoreError>> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify_api_error(e, "Pod", &format!("{namespace}/{name}")))
    }
}

/// Typed store for one namespaced custom resource kind.
pub struct KubeResourceStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeResourceStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeResourceStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_key<K: Resource<DynamicType = ()>>(obj: &K) -> Result<ObjectKey, Report<StoreError>> {
    ObjectKey::for_object(obj).change_context_lazy(|| StoreError::InvalidObject {
        message: format!("{} lacks a name or namespace", K::kind(&())),
    })
}

#[async_trait]
impl<K> ResourceStore<K> for KubeResourceStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Report<StoreError>> {
        self.api(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| classify_api_error(e, &K::kind(&()), &key.to_string()))
    }

    async fn create(&self, obj: &K) -> Result<K, Report<StoreError>> {
        let key = object_key(obj)?;
        self.api(&key.namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| classify_api_error(e, &K::kind(&()), &key.to_string()))
    }

    async fn replace_status(&self, obj: &K) -> Result<K, Report<StoreError>> {
        let key = object_key(obj)?;
        let body = serde_json::to_vec(obj).change_context_lazy(|| StoreError::InvalidObject {
            message: format!("cannot serialize {key}"),
        })?;
        self.api(&key.namespace)
            .replace_status(&key.name, &PostParams::default(), body)
            .await
            .map_err(|e| classify_api_error(e, &K::kind(&()), &key.to_string()))
    }
}
