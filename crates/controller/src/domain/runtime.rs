//! Worker loop pulling keys off a work queue and running a reconciler on them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::key::ObjectKey;
use crate::domain::reconcile::Reconcile;
use crate::domain::reconcile::ReconcileError;
use crate::domain::workqueue::WorkQueue;

/// Result of handling one dequeued key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    Succeeded,
    Requeued,
    Dropped,
    /// The queue was shut down; no key was handled
    Closed,
}

pub struct ControllerRuntime<R> {
    queue: Arc<WorkQueue<ObjectKey>>,
    reconciler: Arc<R>,
    workers: usize,
}

impl<R: Reconcile + 'static> ControllerRuntime<R> {
    pub fn new(queue: Arc<WorkQueue<ObjectKey>>, reconciler: Arc<R>, workers: usize) -> Self {
        Self {
            queue,
            reconciler,
            workers: workers.max(1),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    /// Runs the workers until `cancellation_token` fires, then shuts the queue
    /// and waits for in-flight passes to return.
    #[tracing::instrument(skip_all, fields(controller = self.reconciler.kind(), workers = self.workers))]
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!("Starting controller workers");

        let workers = (0..self.workers).map(|worker| {
            let token = cancellation_token.clone();
            async move {
                while self.process_next(&token).await != Processed::Closed {}
                debug!(worker, "worker stopped");
            }
        });

        let shutdown = async {
            cancellation_token.cancelled().await;
            info!("Shutdown requested, closing work queue");
            self.queue.shutdown();
        };

        tokio::join!(futures::future::join_all(workers), shutdown);
        info!("Controller workers stopped");
    }

    /// Waits for one key and reconciles it, applying the requeue policy:
    /// success forgets the key's failure history, a retryable failure requeues
    /// it with backoff and anything else drops it.
    pub async fn process_next(&self, cancellation_token: &CancellationToken) -> Processed {
        let Some(key) = self.queue.get().await else {
            return Processed::Closed;
        };

        let processed = match self.reconciler.reconcile(&key, cancellation_token).await {
            Ok(()) => {
                self.queue.forget(&key);
                Processed::Succeeded
            }
            Err(report) => match report.current_context() {
                ReconcileError::Cancelled { .. } => {
                    debug!(key = %key, "reconcile cancelled by shutdown");
                    Processed::Dropped
                }
                context if context.is_retryable() => {
                    warn!(
                        key = %key,
                        requeues = self.queue.num_requeues(&key),
                        "reconcile failed, requeueing: {report:?}"
                    );
                    self.queue.add_rate_limited(key.clone());
                    Processed::Requeued
                }
                _ => {
                    error!(key = %key, "reconcile failed permanently, dropping key: {report:?}");
                    self.queue.forget(&key);
                    Processed::Dropped
                }
            },
        };

        self.queue.done(&key);
        processed
    }
}
