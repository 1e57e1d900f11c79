use std::sync::Arc;

use anyhow::Result;
use api_types::PipelineRun;
use api_types::TaskRun;
use api_types::TrackPod;
use kube::Client;

use crate::app::services::ApplicationServices;
use crate::app::services::ControllerHandle;
use crate::app::Application;
use crate::app::PipelineOrchestratorType;
use crate::app::TrackPodReconcilerType;
use crate::config::Cli;
use crate::domain::pod_management::PodLifecycleManager;
use crate::domain::reconcile::ConvergenceWaiter;
use crate::domain::reconcile::PipelineOrchestrator;
use crate::domain::reconcile::StatusReporter;
use crate::domain::reconcile::TrackPodReconciler;
use crate::domain::reconcile::WaitConfig;
use crate::domain::runtime::ControllerRuntime;
use crate::domain::workqueue::WorkQueue;
use crate::infrastructure::k8s::KubePodStore;
use crate::infrastructure::k8s::KubeResourceStore;
use crate::infrastructure::k8s::ResourceWatcher;
use crate::infrastructure::kube_client;

/// Application builder
pub struct ApplicationBuilder {
    cli: Cli,
}

impl ApplicationBuilder {
    /// Create new application builder
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Build complete application
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        if self.cli.disable_trackpod && self.cli.disable_pipelinerun {
            anyhow::bail!("both controllers are disabled, nothing to run");
        }

        let client = kube_client::init_kube_client(self.cli.kubeconfig_path())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;
        let pods = PodLifecycleManager::new(Arc::new(KubePodStore::new(client.clone())));

        let trackpod = (!self.cli.disable_trackpod)
            .then(|| self.create_trackpod_controller(&client, &pods));
        let pipelinerun = (!self.cli.disable_pipelinerun)
            .then(|| self.create_pipelinerun_controller(&client, &pods));

        let services = ApplicationServices {
            trackpod,
            pipelinerun,
        };
        Ok(Application::new(services, self.cli))
    }

    fn create_trackpod_controller(
        &self,
        client: &Client,
        pods: &PodLifecycleManager<KubePodStore>,
    ) -> ControllerHandle<TrackPod, TrackPodReconcilerType> {
        let queue = Arc::new(WorkQueue::new("trackpods"));
        let watcher = ResourceWatcher::<TrackPod>::new(
            client.clone(),
            self.cli.namespace.as_deref(),
            queue.clone(),
        );
        let cache = watcher.store();

        let reconciler = TrackPodReconciler::new(
            Arc::new(cache.clone()),
            pods.clone(),
            ConvergenceWaiter::new(pods.clone(), WaitConfig::default()),
            StatusReporter::new(Arc::new(KubeResourceStore::new(client.clone()))),
        );

        ControllerHandle {
            watcher,
            cache,
            runtime: Arc::new(ControllerRuntime::new(
                queue,
                Arc::new(reconciler),
                usize::from(self.cli.workers),
            )),
        }
    }

    fn create_pipelinerun_controller(
        &self,
        client: &Client,
        pods: &PodLifecycleManager<KubePodStore>,
    ) -> ControllerHandle<PipelineRun, PipelineOrchestratorType> {
        let queue = Arc::new(WorkQueue::new("pipelineruns"));
        let watcher = ResourceWatcher::<PipelineRun>::new(
            client.clone(),
            self.cli.namespace.as_deref(),
            queue.clone(),
        );
        let cache = watcher.store();

        let orchestrator = PipelineOrchestrator::new(
            Arc::new(cache.clone()),
            Arc::new(KubeResourceStore::<PipelineRun>::new(client.clone())),
            Arc::new(KubeResourceStore::<TaskRun>::new(client.clone())),
            pods.clone(),
            ConvergenceWaiter::new(pods.clone(), WaitConfig::default()),
        );

        ControllerHandle {
            watcher,
            cache,
            runtime: Arc::new(ControllerRuntime::new(
                queue,
                Arc::new(orchestrator),
                usize::from(self.cli.workers),
            )),
        }
    }
}
