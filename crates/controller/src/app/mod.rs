//! Application module
//!
//! Builds the controllers from the command line, runs them as background
//! tasks and coordinates graceful shutdown.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

use api_types::PipelineRun;
use api_types::TaskRun;
use api_types::TrackPod;
use kube::runtime::reflector::Store;

use crate::domain::reconcile::PipelineOrchestrator;
use crate::domain::reconcile::TrackPodReconciler;
use crate::infrastructure::k8s::KubePodStore;
use crate::infrastructure::k8s::KubeResourceStore;

// Re-export main types
pub use builder::ApplicationBuilder;
pub use core::Application;
pub use services::ApplicationServices;

/// TrackPod reconciler wired to the cluster.
pub type TrackPodReconcilerType =
    TrackPodReconciler<Store<TrackPod>, KubeResourceStore<TrackPod>, KubePodStore>;

/// PipelineRun orchestrator wired to the cluster.
pub type PipelineOrchestratorType = PipelineOrchestrator<
    Store<PipelineRun>,
    KubeResourceStore<PipelineRun>,
    KubeResourceStore<TaskRun>,
    KubePodStore,
>;
