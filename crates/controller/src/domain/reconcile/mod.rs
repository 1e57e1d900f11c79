//! Level-triggered reconcilers for the custom resources
//!
//! A reconciler receives only the key of the object that changed. It reads
//! the desired state from the cache and the observed pods from the API server,
//! acts on the difference and reports what it observed.

pub mod convergence;
pub mod pipeline;
pub mod plan;
pub mod status;
pub mod trackpod;

use core::error::Error;

use async_trait::async_trait;
use error_stack::Report;
use tokio_util::sync::CancellationToken;

use crate::domain::key::ObjectKey;
use crate::domain::pod_management::PodError;

// Re-export commonly used types
pub use convergence::ConvergenceWaiter;
pub use convergence::WaitConfig;
pub use convergence::WaitOutcome;
pub use pipeline::PipelineOrchestrator;
pub use status::StatusReporter;
pub use trackpod::TrackPodReconciler;

/// Why a reconcile pass failed, classified for the requeue policy.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ReconcileError {
    /// A store call failed; a later pass may succeed unchanged
    #[display("store request failed while reconciling {key}")]
    Store { key: ObjectKey },
    /// Pod names kept colliding past the retry cap
    #[display("could not find a free pod name for {key}")]
    NameCollision { key: ObjectKey },
    /// The object cannot be acted on until it is changed
    #[display("{key} cannot be reconciled in its current form")]
    InvalidObject { key: ObjectKey },
    /// Shutdown interrupted the pass
    #[display("reconcile of {key} cancelled")]
    Cancelled { key: ObjectKey },
}

impl Error for ReconcileError {}

impl ReconcileError {
    /// Whether the key should be requeued with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Reclassifies a pod failure raised while reconciling `key`.
    pub(crate) fn from_pod_error(report: Report<PodError>, key: &ObjectKey) -> Report<Self> {
        let key = key.clone();
        let context = match report.current_context() {
            err if err.is_retryable() => Self::Store { key },
            PodError::NameCollision { .. } => Self::NameCollision { key },
            _ => Self::InvalidObject { key },
        };
        report.change_context(context)
    }
}

/// One reconcile pass for the object identified by `key`.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Resource kind handled, used in logs and queue names.
    fn kind(&self) -> &'static str;

    /// Drives the cluster towards the desired state of `key`.
    ///
    /// An object that no longer exists is not an error. `cancel` fires when
    /// the controller shuts down; long waits must give up promptly.
    ///
    /// # Errors
    ///
    /// A [`ReconcileError`] whose [`ReconcileError::is_retryable`] decides
    /// whether the key is requeued.
    async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ReconcileError>>;
}
