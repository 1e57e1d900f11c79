//! Reconciler keeping a `TrackPod`'s long-running pod group in line with its spec.

use std::sync::Arc;

use api_types::TrackPod;
use api_types::Workload;
use async_trait::async_trait;
use error_stack::Report;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::convergence::ConvergenceWaiter;
use super::convergence::WaitOutcome;
use super::plan::plan;
use super::plan::Action;
use super::status::StatusError;
use super::status::StatusReporter;
use super::Reconcile;
use super::ReconcileError;
use crate::domain::key::ObjectKey;
use crate::domain::pod_management::PodFilter;
use crate::domain::pod_management::PodLifecycleManager;
use crate::domain::pod_management::PodOwner;
use crate::domain::pod_management::PodTemplate;
use crate::domain::store::ObjectCache;
use crate::domain::store::PodStore;
use crate::domain::store::ResourceStore;

/// What one pass did, for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub action: Option<Action>,
    pub deleted: Vec<String>,
    pub created: u32,
    pub outcome: Option<WaitOutcome>,
    pub reported: Option<u32>,
}

pub struct TrackPodReconciler<C, R, P> {
    cache: Arc<C>,
    pods: PodLifecycleManager<P>,
    waiter: ConvergenceWaiter<P>,
    status: StatusReporter<TrackPod, R>,
}

impl<C, R, P> TrackPodReconciler<C, R, P>
where
    C: ObjectCache<TrackPod>,
    R: ResourceStore<TrackPod>,
    P: PodStore,
{
    pub fn new(
        cache: Arc<C>,
        pods: PodLifecycleManager<P>,
        waiter: ConvergenceWaiter<P>,
        status: StatusReporter<TrackPod, R>,
    ) -> Self {
        Self {
            cache,
            pods,
            waiter,
            status,
        }
    }

    /// Runs one reconcile pass for `key` and reports what it did.
    ///
    /// # Errors
    ///
    /// See [`Reconcile::reconcile`].
    #[tracing::instrument(skip_all, fields(kind = "TrackPod", key = %key))]
    pub async fn sync(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, Report<ReconcileError>> {
        let Some(tpod) = self.cache.get(key) else {
            debug!(key = %key, "trackpod no longer exists, nothing to do");
            return Ok(SyncSummary::default());
        };

        let owner = PodOwner::from_resource(tpod.as_ref(), PodTemplate::LongRunning)
            .map_err(|e| ReconcileError::from_pod_error(e, key))?;
        let pods = self
            .pods
            .list_owned(&owner)
            .await
            .map_err(|e| ReconcileError::from_pod_error(e, key))?;

        let desired = tpod.count();
        let plan = plan(tpod.message(), &tpod.observed().message, desired, &pods);
        if !plan.is_noop() {
            info!(
                key = %key,
                action = %plan.action,
                deletes = plan.deletes.len(),
                creates = plan.creates,
                "converging trackpod"
            );
        }

        for name in &plan.deletes {
            self.pods
                .delete_pod(&owner.namespace, name)
                .await
                .map_err(|e| ReconcileError::from_pod_error(e, key))?;
        }
        for _ in 0..plan.creates {
            self.pods
                .create_pod(&owner)
                .await
                .map_err(|e| ReconcileError::from_pod_error(e, key))?;
        }

        let outcome = self
            .waiter
            .wait_for_count(
                &owner.namespace,
                &owner.name,
                PodFilter::Running,
                desired,
                cancel,
            )
            .await;
        match outcome {
            WaitOutcome::Converged { .. } => {}
            WaitOutcome::TimedOut { observed } => warn!(
                key = %key,
                observed,
                desired,
                "trackpod did not converge in time, reporting partial status"
            ),
            WaitOutcome::Cancelled { .. } => {
                return Err(Report::new(ReconcileError::Cancelled { key: key.clone() }));
            }
        }

        let observed = match self
            .pods
            .count(&owner.namespace, &owner.name, PodFilter::Running)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("failed to recount running pods, using last poll: {e:?}");
                outcome.observed()
            }
        };

        let reported = match self.status.report(key, observed, tpod.message()).await {
            Ok(_) => Some(observed),
            Err(e) if matches!(e.current_context(), StatusError::Gone { .. }) => {
                debug!(key = %key, "trackpod deleted before status write");
                None
            }
            Err(e) => {
                return Err(e.change_context(ReconcileError::Store { key: key.clone() }));
            }
        };

        Ok(SyncSummary {
            action: Some(plan.action),
            deleted: plan.deletes,
            created: plan.creates,
            outcome: Some(outcome),
            reported,
        })
    }
}

#[async_trait]
impl<C, R, P> Reconcile for TrackPodReconciler<C, R, P>
where
    C: ObjectCache<TrackPod>,
    R: ResourceStore<TrackPod>,
    P: PodStore,
{
    fn kind(&self) -> &'static str {
        "TrackPod"
    }

    async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ReconcileError>> {
        self.sync(key, cancel).await.map(|_| ())
    }
}
