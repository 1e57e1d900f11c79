//! Creation and deletion of worker pods on behalf of an owning resource.

use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::template::PodOwner;
use super::types::PodError;
use super::types::PodFilter;
use crate::domain::store::PodStore;

/// Bounded retry applied when a generated pod name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateRetry {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for CreateRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
        }
    }
}

/// Generates `<owner>-<8 hex chars>` pod names.
pub fn generate_pod_name(owner: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{owner}-{}", &suffix[..8])
}

/// Creates, deletes and counts the pods owned by a resource.
pub struct PodLifecycleManager<S> {
    store: Arc<S>,
    retry: CreateRetry,
}

impl<S> Clone for PodLifecycleManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry,
        }
    }
}

impl<S: PodStore> PodLifecycleManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_retry(store, CreateRetry::default())
    }

    pub fn with_retry(store: Arc<S>, retry: CreateRetry) -> Self {
        Self { store, retry }
    }

    /// Creates one pod for `owner`.
    ///
    /// A name collision is retried with a fresh name and exponential backoff,
    /// up to [`CreateRetry::max_attempts`] attempts.
    ///
    /// # Errors
    ///
    /// - [`PodError::NameCollision`] if every attempt collided
    /// - [`PodError::Create`] on any other store failure
    pub async fn create_pod(&self, owner: &PodOwner) -> Result<Pod, Report<PodError>> {
        let mut delay = self.retry.base_delay;

        for attempt in 1..=self.retry.max_attempts {
            let pod = owner.build_pod(&generate_pod_name(&owner.name));

            match self.store.create(&owner.namespace, &pod).await {
                Ok(created) => {
                    info!(
                        owner = %owner.name,
                        pod = %created.name_any(),
                        "pod created"
                    );
                    return Ok(created);
                }
                Err(report) if report.current_context().is_already_exists() => {
                    warn!(
                        owner = %owner.name,
                        attempt,
                        "pod name already taken, retrying with a new name"
                    );
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay = delay.saturating_mul(2);
                    }
                }
                Err(report) => {
                    return Err(report.change_context(PodError::Create {
                        owner: owner.name.clone(),
                    }));
                }
            }
        }

        Err(Report::new(PodError::NameCollision {
            owner: owner.name.clone(),
            attempts: self.retry.max_attempts,
        }))
    }

    /// Deletes pod `namespace/name`. A pod that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// - [`PodError::Delete`] if the store rejects the deletion
    pub async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Report<PodError>> {
        match self.store.delete(namespace, name).await {
            Ok(()) => {
                info!(pod = %name, namespace = %namespace, "pod deleted");
                Ok(())
            }
            Err(report) if report.current_context().is_not_found() => {
                debug!(pod = %name, namespace = %namespace, "pod already gone");
                Ok(())
            }
            Err(report) => Err(report.change_context(PodError::Delete {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })),
        }
    }

    /// Lists all pods carrying `owner`'s ownership label, straight from the API server.
    ///
    /// # Errors
    ///
    /// - [`PodError::List`] if the list call fails
    pub async fn list_owned(&self, owner: &PodOwner) -> Result<Vec<Pod>, Report<PodError>> {
        self.list_by_label(&owner.namespace, &owner.name).await
    }

    async fn list_by_label(
        &self,
        namespace: &str,
        owner_name: &str,
    ) -> Result<Vec<Pod>, Report<PodError>> {
        self.store
            .list(namespace, &super::types::owner_selector(owner_name))
            .await
            .change_context(PodError::List {
                owner: owner_name.to_string(),
            })
    }

    /// Counts `owner`'s pods matching `filter`.
    ///
    /// # Errors
    ///
    /// - [`PodError::List`] if the list call fails
    pub async fn count(
        &self,
        namespace: &str,
        owner_name: &str,
        filter: PodFilter,
    ) -> Result<u32, Report<PodError>> {
        let pods = self.list_by_label(namespace, owner_name).await?;
        let matching = pods.iter().filter(|pod| filter.matches(pod)).count();
        Ok(u32::try_from(matching).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use api_types::TrackPod;
    use api_types::TrackPodSpec;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::mock::FakePodStore;
    use crate::domain::pod_management::PodTemplate;

    fn owner() -> PodOwner {
        let mut tpod = TrackPod::new(
            "greeter",
            TrackPodSpec {
                message: "hello".to_string(),
                count: 2,
            },
        );
        tpod.metadata.namespace = Some("default".to_string());
        tpod.metadata.uid = Some("uid-greeter".to_string());
        PodOwner::from_resource(&tpod, PodTemplate::LongRunning).expect("valid owner")
    }

    #[test]
    fn generated_names_are_prefixed_and_unique() {
        let a = generate_pod_name("greeter");
        let b = generate_pod_name("greeter");
        assert!(a.starts_with("greeter-"));
        assert_eq!(a.len(), "greeter-".len() + 8);
        assert_ne!(a, b);
    }

    #[test(tokio::test(start_paused = true))]
    async fn create_retries_name_collisions() {
        let store = FakePodStore::new();
        store.set_collisions(2);
        let manager = PodLifecycleManager::new(store.clone());

        let pod = manager.create_pod(&owner()).await.expect("third attempt succeeds");

        assert_eq!(store.created(), vec![pod.name_any()]);
    }

    #[test(tokio::test(start_paused = true))]
    async fn create_gives_up_after_max_attempts() {
        let store = FakePodStore::new();
        store.set_collisions(10);
        let manager = PodLifecycleManager::new(store.clone());

        let err = manager
            .create_pod(&owner())
            .await
            .expect_err("every attempt collides");

        assert!(matches!(
            err.current_context(),
            PodError::NameCollision { attempts: 5, .. }
        ));
        assert!(!err.current_context().is_retryable());
        assert!(store.created().is_empty());
    }

    #[test(tokio::test)]
    async fn create_surfaces_other_failures_as_retryable() {
        let store = FakePodStore::new();
        store.set_fail_create(true);
        let manager = PodLifecycleManager::new(store);

        let err = manager.create_pod(&owner()).await.expect_err("create fails");
        assert!(matches!(err.current_context(), PodError::Create { .. }));
        assert!(err.current_context().is_retryable());
    }

    #[test(tokio::test)]
    async fn delete_tolerates_missing_pod() {
        let store = FakePodStore::new();
        let manager = PodLifecycleManager::new(store.clone());

        manager
            .delete_pod("default", "never-existed")
            .await
            .expect("missing pod counts as deleted");
        assert!(store.deleted().is_empty());
    }

    #[test(tokio::test)]
    async fn count_filters_by_owner_and_phase() {
        let store = FakePodStore::new();
        store.insert_pod("default", "greeter-1", "greeter", "Running");
        store.insert_pod("default", "greeter-2", "greeter", "Pending");
        store.insert_pod("default", "greeter-3", "greeter", "Failed");
        store.insert_pod("default", "other-1", "other", "Running");
        store.insert_pod("elsewhere", "greeter-4", "greeter", "Running");
        let manager = PodLifecycleManager::new(store);

        let running = manager
            .count("default", "greeter", PodFilter::Running)
            .await
            .expect("count");
        let active = manager
            .count("default", "greeter", PodFilter::Active)
            .await
            .expect("count");

        assert_eq!(running, 1);
        assert_eq!(active, 2);
    }

    #[test(tokio::test)]
    async fn list_failure_is_retryable() {
        let store = FakePodStore::new();
        store.set_fail_list(true);
        let manager = PodLifecycleManager::new(store);

        let err = manager.list_owned(&owner()).await.expect_err("list fails");
        assert!(err.current_context().is_retryable());
    }
}
