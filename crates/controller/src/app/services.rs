use std::fmt::Debug;
use std::sync::Arc;

use api_types::PipelineRun;
use api_types::TrackPod;
use kube::runtime::reflector::Store;
use kube::Resource;
use serde::de::DeserializeOwned;

use crate::app::PipelineOrchestratorType;
use crate::app::TrackPodReconcilerType;
use crate::domain::runtime::ControllerRuntime;
use crate::infrastructure::k8s::ResourceWatcher;

/// Everything needed to run one controller: the event source feeding its
/// queue, the cache the event source fills and the workers draining the queue.
pub struct ControllerHandle<K, R>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    pub watcher: ResourceWatcher<K>,
    pub cache: Store<K>,
    pub runtime: Arc<ControllerRuntime<R>>,
}

/// Application dependencies
pub struct ApplicationServices {
    pub trackpod: Option<ControllerHandle<TrackPod, TrackPodReconcilerType>>,
    pub pipelinerun: Option<ControllerHandle<PipelineRun, PipelineOrchestratorType>>,
}
