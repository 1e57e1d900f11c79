use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use futures::StreamExt;
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::Store;
use kube::runtime::watcher;
use kube::runtime::watcher::Event;
use kube::Api;
use kube::Client;
use kube::Resource;
use serde::de::DeserializeOwned;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::key::ObjectKey;
use crate::domain::store::ObjectCache;
use crate::domain::workqueue::WorkQueue;
use crate::infrastructure::k8s::types::KubernetesError;

const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Watches one resource kind, keeps a local cache of it and enqueues the key
/// of every object that is added, changed or deleted.
pub struct ResourceWatcher<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    api: Api<K>,
    writer: Writer<K>,
    queue: Arc<WorkQueue<ObjectKey>>,
}

impl<K> ResourceWatcher<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    /// Watches `namespace`, or every namespace when `None`.
    pub fn new(client: Client, namespace: Option<&str>, queue: Arc<WorkQueue<ObjectKey>>) -> Self
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self {
            api,
            writer: Writer::default(),
            queue,
        }
    }

    /// Read handle on the cache filled by this watcher.
    pub fn store(&self) -> Store<K> {
        self.writer.as_reader()
    }

    /// Watches until cancelled, restarting the watch after stream failures.
    #[tracing::instrument(skip_all, fields(kind = %K::kind(&()), queue = self.queue.name()))]
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        info!("Starting resource watcher");
        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Resource watcher shutdown requested");
                    break;
                }
                result = self.watch() => {
                    match result {
                        Ok(()) => warn!("Watch stream ended unexpectedly, restarting..."),
                        Err(e) => {
                            error!("Watch failed: {e:?}");
                            select! {
                                _ = cancellation_token.cancelled() => break,
                                _ = tokio::time::sleep(RESTART_DELAY) => {}
                            }
                        }
                    }
                }
            }
        }
    }

    async fn watch(&mut self) -> Result<(), Report<KubernetesError>> {
        let mut stream = watcher(self.api.clone(), watcher::Config::default()).boxed();

        while let Some(event) = stream.next().await {
            let event = event.change_context_lazy(|| KubernetesError::WatchFailed {
                kind: K::kind(&()).to_string(),
                message: "watch stream error".to_string(),
            })?;
            self.writer.apply_watcher_event(&event);
            enqueue_event(&self.queue, &event);
        }

        Ok(())
    }
}

/// Enqueues the key of every object carried by `event`. Objects without a
/// name or namespace are logged and skipped.
pub(crate) fn enqueue_event<K: Resource>(queue: &WorkQueue<ObjectKey>, event: &Event<K>) {
    let objects: &[K] = match event {
        Event::Applied(obj) | Event::Deleted(obj) => std::slice::from_ref(obj),
        Event::Restarted(objs) => objs,
    };
    for obj in objects {
        match ObjectKey::for_object(obj) {
            Ok(key) => queue.add(key),
            Err(e) => warn!("Dropping event without a usable key: {e}"),
        }
    }
}

impl<K> ObjectCache<K> for Store<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        Store::get(self, &key.object_ref())
    }
}
