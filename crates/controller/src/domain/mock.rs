//! Test adapters implementing the store and cache traits
//!
//! The fakes keep objects in memory, record every mutating call, and can be
//! switched into failure modes to exercise error handling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use api_types::Workload;
use async_trait::async_trait;
use chrono::TimeZone;
use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;
use kube::ResourceExt;

use crate::domain::key::ObjectKey;
use crate::domain::pod_management::OWNER_LABEL;
use crate::domain::store::ObjectCache;
use crate::domain::store::PodStore;
use crate::domain::store::ResourceStore;
use crate::domain::store::StoreError;

fn api_error(message: &str) -> Report<StoreError> {
    Report::new(StoreError::Api {
        message: message.to_string(),
    })
}

fn timestamp(seconds: i64) -> Time {
    Time(
        chrono::Utc
            .timestamp_opt(1_700_000_000 + seconds, 0)
            .single()
            .expect("valid timestamp"),
    )
}

#[derive(Default)]
struct PodStoreState {
    pods: Vec<Pod>,
    created: Vec<String>,
    deleted: Vec<String>,
    auto_phase: Option<String>,
    collisions: u32,
    clock: i64,
    fail_list: bool,
    fail_create: bool,
    fail_delete: bool,
}

/// In-memory pod store recording create/delete calls
#[derive(Default)]
pub struct FakePodStore {
    state: Mutex<PodStoreState>,
}

impl FakePodStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Phase assigned to every pod created from now on
    pub fn set_auto_phase(&self, phase: Option<&str>) {
        self.state.lock().unwrap().auto_phase = phase.map(str::to_string);
    }

    /// The next `n` creates fail with `AlreadyExists`
    pub fn set_collisions(&self, n: u32) {
        self.state.lock().unwrap().collisions = n;
    }

    pub fn set_fail_list(&self, enabled: bool) {
        self.state.lock().unwrap().fail_list = enabled;
    }

    pub fn set_fail_create(&self, enabled: bool) {
        self.state.lock().unwrap().fail_create = enabled;
    }

    pub fn set_fail_delete(&self, enabled: bool) {
        self.state.lock().unwrap().fail_delete = enabled;
    }

    /// Seeds a pod owned by `owner`; later seeds get later creation timestamps
    pub fn insert_pod(&self, namespace: &str, name: &str, owner: &str, phase: &str) {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    OWNER_LABEL.to_string(),
                    owner.to_string(),
                )])),
                creation_timestamp: Some(timestamp(state.clock)),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        };
        state.pods.push(pod);
    }

    /// Moves every pod owned by `owner` into `phase`
    pub fn set_phase_for_owner(&self, owner: &str, phase: &str) {
        let mut state = self.state.lock().unwrap();
        for pod in state.pods.iter_mut().filter(|p| owned_by(p, owner)) {
            pod.status = Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            });
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn pods(&self) -> Vec<Pod> {
        self.state.lock().unwrap().pods.clone()
    }

    pub fn pods_of(&self, owner: &str) -> Vec<Pod> {
        self.pods()
            .into_iter()
            .filter(|p| owned_by(p, owner))
            .collect()
    }
}

fn owned_by(pod: &Pod, owner: &str) -> bool {
    pod.labels().get(OWNER_LABEL).map(String::as_str) == Some(owner)
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => pod.labels().get(key).map(String::as_str) == Some(value),
            None => false,
        })
}

#[async_trait]
impl PodStore for FakePodStore {
    async fn list(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Pod>, Report<StoreError>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(api_error("list failed"));
        }
        Ok(state
            .pods
            .iter()
            .filter(|p| p.namespace().as_deref() == Some(namespace))
            .filter(|p| matches_selector(p, label_selector))
            .cloned()
            .collect())
    }

    async fn create(&self, namespace: &str, pod: &Pod) -> Result<Pod, Report<StoreError>> {
        let mut state = self.state.lock().unwrap();
        let name = pod.name_any();
        if state.fail_create {
            return Err(api_error("create failed"));
        }
        if state.collisions > 0 {
            state.collisions -= 1;
            return Err(Report::new(StoreError::AlreadyExists {
                kind: "Pod".to_string(),
                key: format!("{namespace}/{name}"),
            }));
        }
        if state.pods.iter().any(|p| p.name_any() == name) {
            return Err(Report::new(StoreError::AlreadyExists {
                kind: "Pod".to_string(),
                key: format!("{namespace}/{name}"),
            }));
        }

        state.clock += 1;
        let mut created = pod.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.creation_timestamp = Some(timestamp(state.clock));
        created.status = state.auto_phase.as_ref().map(|phase| PodStatus {
            phase: Some(phase.clone()),
            ..Default::default()
        });
        state.pods.push(created.clone());
        state.created.push(name);
        Ok(created)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Report<StoreError>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(api_error("delete failed"));
        }
        let before = state.pods.len();
        state
            .pods
            .retain(|p| !(p.name_any() == name && p.namespace().as_deref() == Some(namespace)));
        if state.pods.len() == before {
            return Err(Report::new(StoreError::NotFound {
                kind: "Pod".to_string(),
                key: format!("{namespace}/{name}"),
            }));
        }
        state.deleted.push(name.to_string());
        Ok(())
    }
}

struct ResourceStoreState<K> {
    objects: BTreeMap<ObjectKey, K>,
    created: Vec<ObjectKey>,
    status_writes: Vec<ObjectKey>,
    next_version: u64,
    conflict_next_write: bool,
    fail_get: bool,
}

/// In-memory custom resource store that also serves as the watch cache
pub struct FakeResourceStore<K> {
    state: Mutex<ResourceStoreState<K>>,
}

impl<K> FakeResourceStore<K>
where
    K: Resource<DynamicType = ()> + Workload + Clone,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ResourceStoreState {
                objects: BTreeMap::new(),
                created: Vec::new(),
                status_writes: Vec::new(),
                next_version: 1,
                conflict_next_write: false,
                fail_get: false,
            }),
        })
    }

    /// Stores `obj` as if a user had applied it; assigns uid, generation and version
    pub fn apply(&self, mut obj: K) -> ObjectKey {
        let key = ObjectKey::for_object(&obj).expect("fake objects need name and namespace");
        let mut state = self.state.lock().unwrap();
        let meta = obj.meta_mut();
        meta.uid.get_or_insert_with(|| format!("uid-{}", key.name));
        meta.generation.get_or_insert(1);
        meta.resource_version = Some(state.next_version.to_string());
        state.next_version += 1;
        state.objects.insert(key.clone(), obj);
        key
    }

    pub fn object(&self, key: &ObjectKey) -> Option<K> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn objects(&self) -> Vec<K> {
        self.state.lock().unwrap().objects.values().cloned().collect()
    }

    pub fn remove(&self, key: &ObjectKey) {
        self.state.lock().unwrap().objects.remove(key);
    }

    pub fn created(&self) -> Vec<ObjectKey> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn status_writes(&self) -> Vec<ObjectKey> {
        self.state.lock().unwrap().status_writes.clone()
    }

    /// The next status write fails with a conflict
    pub fn set_conflict_next_write(&self, enabled: bool) {
        self.state.lock().unwrap().conflict_next_write = enabled;
    }

    pub fn set_fail_get(&self, enabled: bool) {
        self.state.lock().unwrap().fail_get = enabled;
    }
}

#[async_trait]
impl<K> ResourceStore<K> for FakeResourceStore<K>
where
    K: Resource<DynamicType = ()> + Workload + Clone + Send + Sync,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Report<StoreError>> {
        let state = self.state.lock().unwrap();
        if state.fail_get {
            return Err(api_error("get failed"));
        }
        Ok(state.objects.get(key).cloned())
    }

    async fn create(&self, obj: &K) -> Result<K, Report<StoreError>> {
        let key = ObjectKey::for_object(obj).map_err(|e| {
            Report::new(StoreError::InvalidObject {
                message: e.to_string(),
            })
        })?;
        let mut state = self.state.lock().unwrap();
        if state.objects.contains_key(&key) {
            return Err(Report::new(StoreError::AlreadyExists {
                kind: K::kind(&()).to_string(),
                key: key.to_string(),
            }));
        }
        let mut created = obj.clone();
        let meta = created.meta_mut();
        meta.uid = Some(format!("uid-{}", key.name));
        meta.generation = Some(1);
        meta.resource_version = Some(state.next_version.to_string());
        state.next_version += 1;
        state.objects.insert(key.clone(), created.clone());
        state.created.push(key);
        Ok(created)
    }

    async fn replace_status(&self, obj: &K) -> Result<K, Report<StoreError>> {
        let key = ObjectKey::for_object(obj).map_err(|e| {
            Report::new(StoreError::InvalidObject {
                message: e.to_string(),
            })
        })?;
        let mut state = self.state.lock().unwrap();
        let conflict = Report::new(StoreError::Conflict {
            kind: K::kind(&()).to_string(),
            key: key.to_string(),
        });
        if state.conflict_next_write {
            state.conflict_next_write = false;
            return Err(conflict);
        }
        let next_version = state.next_version.to_string();
        let Some(stored) = state.objects.get_mut(&key) else {
            return Err(Report::new(StoreError::NotFound {
                kind: K::kind(&()).to_string(),
                key: key.to_string(),
            }));
        };
        if stored.meta().resource_version != obj.meta().resource_version {
            return Err(conflict);
        }
        stored.set_observed(obj.observed());
        stored.meta_mut().resource_version = Some(next_version);
        let updated = stored.clone();
        state.next_version += 1;
        state.status_writes.push(key);
        Ok(updated)
    }
}

impl<K> ObjectCache<K> for FakeResourceStore<K>
where
    K: Resource<DynamicType = ()> + Workload + Clone + Send + Sync,
{
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(key)
            .cloned()
            .map(Arc::new)
    }
}
