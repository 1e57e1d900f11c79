//! Two-level orchestration: a `PipelineRun` spawns one `TaskRun` per
//! generation, the `TaskRun` fans out run-to-completion pods, and completed
//! counts flow back up through both statuses.

use std::sync::Arc;

use api_types::PipelineRun;
use api_types::TaskRun;
use api_types::TaskRunSpec;
use api_types::Workload;
use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use kube::Resource;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::convergence::ConvergenceWaiter;
use super::convergence::WaitOutcome;
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

/// Name of the `TaskRun` serving `generation` of pipeline run `pipeline`.
pub fn task_run_name(pipeline: &str, generation: i64) -> String {
    format!("{pipeline}-trun-{generation}")
}

/// Where a pipeline run stood when the pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PipelineStage {
    /// The pipeline run is gone
    #[display("absent")]
    Absent,
    /// Status already mirrors the spec
    #[display("idle")]
    Idle,
    /// Statuses were propagated from the task run
    #[display("propagated")]
    Propagated,
}

/// What one pass did, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub stage: PipelineStage,
    pub task_run: Option<String>,
    pub task_run_created: bool,
    pub pods_created: u32,
    pub outcome: Option<WaitOutcome>,
}

impl PipelineSummary {
    fn finished(stage: PipelineStage) -> Self {
        Self {
            stage,
            task_run: None,
            task_run_created: false,
            pods_created: 0,
            outcome: None,
        }
    }
}

pub struct PipelineOrchestrator<C, PR, TR, P> {
    cache: Arc<C>,
    task_runs: Arc<TR>,
    pods: PodLifecycleManager<P>,
    waiter: ConvergenceWaiter<P>,
    pipeline_status: StatusReporter<PipelineRun, PR>,
    task_status: StatusReporter<TaskRun, TR>,
}

impl<C, PR, TR, P> PipelineOrchestrator<C, PR, TR, P>
where
    C: ObjectCache<PipelineRun>,
    PR: ResourceStore<PipelineRun>,
    TR: ResourceStore<TaskRun>,
    P: PodStore,
{
    pub fn new(
        cache: Arc<C>,
        pipeline_runs: Arc<PR>,
        task_runs: Arc<TR>,
        pods: PodLifecycleManager<P>,
        waiter: ConvergenceWaiter<P>,
    ) -> Self {
        Self {
            cache,
            task_runs: task_runs.clone(),
            pods,
            waiter,
            pipeline_status: StatusReporter::new(pipeline_runs),
            task_status: StatusReporter::new(task_runs),
        }
    }

    /// Runs one orchestration pass for pipeline run `key`.
    ///
    /// # Errors
    ///
    /// See [`Reconcile::reconcile`].
    #[tracing::instrument(skip_all, fields(kind = "PipelineRun", key = %key))]
    pub async fn sync(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<PipelineSummary, Report<ReconcileError>> {
        let Some(prun) = self.cache.get(key) else {
            debug!(key = %key, "pipelinerun no longer exists, nothing to do");
            return Ok(PipelineSummary::finished(PipelineStage::Absent));
        };
        if prun.is_settled() {
            debug!(key = %key, "pipelinerun status matches spec");
            return Ok(PipelineSummary::finished(PipelineStage::Idle));
        }

        let (trun, task_run_created) = self.ensure_task_run(key, &prun).await?;
        let trun_key = ObjectKey::new(key.namespace.clone(), trun.name_any());

        let owner = PodOwner::from_resource(&trun, PodTemplate::RunToCompletion)
            .map_err(|e| ReconcileError::from_pod_error(e, key))?;
        let active = self
            .pods
            .count(&owner.namespace, &owner.name, PodFilter::Active)
            .await
            .map_err(|e| ReconcileError::from_pod_error(e, key))?;
        let missing = trun.count().saturating_sub(active);
        if missing > 0 {
            info!(key = %key, task_run = %trun_key, missing, "fanning out task pods");
        }
        for _ in 0..missing {
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
                PodFilter::Completed,
                trun.count(),
                cancel,
            )
            .await;
        match outcome {
            WaitOutcome::Converged { .. } => {}
            WaitOutcome::TimedOut { observed } => warn!(
                key = %key,
                task_run = %trun_key,
                observed,
                desired = trun.count(),
                "task pods did not complete in time, reporting partial status"
            ),
            WaitOutcome::Cancelled { .. } => {
                return Err(Report::new(ReconcileError::Cancelled { key: key.clone() }));
            }
        }

        let completed = match self
            .pods
            .count(&owner.namespace, &owner.name, PodFilter::Completed)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("failed to recount completed pods, using last poll: {e:?}");
                outcome.observed()
            }
        };

        let trun = self
            .task_status
            .report(&trun_key, completed, trun.message())
            .await
            .map_err(|e| status_failure(e, key))?;
        let observed = trun.observed();
        match self
            .pipeline_status
            .report(key, observed.count, &observed.message)
            .await
        {
            Ok(_) => {}
            Err(e) if matches!(e.current_context(), StatusError::Gone { .. }) => {
                debug!(key = %key, "pipelinerun deleted before status write");
            }
            Err(e) => return Err(status_failure(e, key)),
        }

        Ok(PipelineSummary {
            stage: PipelineStage::Propagated,
            task_run: Some(trun_key.name),
            task_run_created,
            pods_created: missing,
            outcome: Some(outcome),
        })
    }

    /// Returns the task run for the pipeline run's current generation,
    /// creating it on first sight.
    async fn ensure_task_run(
        &self,
        key: &ObjectKey,
        prun: &PipelineRun,
    ) -> Result<(TaskRun, bool), Report<ReconcileError>> {
        let store_failure = || ReconcileError::Store { key: key.clone() };
        let generation = prun.meta().generation.unwrap_or_default();
        let name = task_run_name(&key.name, generation);
        let trun_key = ObjectKey::new(key.namespace.clone(), name.clone());

        if let Some(existing) = self
            .task_runs
            .get(&trun_key)
            .await
            .change_context_lazy(store_failure)?
        {
            return Ok((existing, false));
        }

        let owner_ref = prun.controller_owner_ref(&()).ok_or_else(|| {
            Report::new(ReconcileError::InvalidObject { key: key.clone() })
                .attach_printable("pipelinerun has no uid")
        })?;
        let mut trun = TaskRun::new(&name, TaskRunSpec::from(&prun.spec));
        trun.metadata.namespace = Some(key.namespace.clone());
        trun.metadata.owner_references = Some(vec![owner_ref]);

        match self.task_runs.create(&trun).await {
            Ok(created) => {
                info!(key = %key, task_run = %name, generation, "task run created");
                Ok((created, true))
            }
            Err(report) if report.current_context().is_already_exists() => {
                debug!(task_run = %name, "task run created concurrently, reading it back");
                let existing = self
                    .task_runs
                    .get(&trun_key)
                    .await
                    .change_context_lazy(store_failure)?
                    .ok_or_else(|| {
                        Report::new(store_failure())
                            .attach_printable(format!("task run {trun_key} vanished after create"))
                    })?;
                Ok((existing, false))
            }
            Err(report) => Err(report.change_context(store_failure())),
        }
    }
}

fn status_failure(report: Report<StatusError>, key: &ObjectKey) -> Report<ReconcileError> {
    report.change_context(ReconcileError::Store { key: key.clone() })
}

#[async_trait]
impl<C, PR, TR, P> Reconcile for PipelineOrchestrator<C, PR, TR, P>
where
    C: ObjectCache<PipelineRun>,
    PR: ResourceStore<PipelineRun>,
    TR: ResourceStore<TaskRun>,
    P: PodStore,
{
    fn kind(&self) -> &'static str {
        "PipelineRun"
    }

    async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ReconcileError>> {
        self.sync(key, cancel).await.map(|_| ())
    }
}
