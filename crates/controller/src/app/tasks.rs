use std::fmt::Debug;
use std::time::Duration;

use anyhow::Result;
use kube::Resource;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::services::ApplicationServices;
use crate::app::services::ControllerHandle;
use crate::domain::reconcile::Reconcile;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start all background tasks
    pub fn spawn_all_tasks(&mut self, services: &mut ApplicationServices) -> Result<()> {
        if let Some(handle) = services.trackpod.take() {
            self.spawn_controller(handle);
        }
        if let Some(handle) = services.pipelinerun.take() {
            self.spawn_controller(handle);
        }

        if self.tasks.is_empty() {
            anyhow::bail!("no controller left to run");
        }
        Ok(())
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        // Set up signal handling for graceful shutdown
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        tokio::select! {
            // Wait for shutdown signal
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
            }
            // Wait for any task to complete unexpectedly
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, _index, _remaining) = result;
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    self.cancellation_token.cancel();
                    self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly, stopping the remaining tasks");
            }
        }

        self.cancellation_token.cancel();
        self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
        Ok(())
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in self.tasks.iter_mut().filter(|task| !task.is_finished()) {
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    /// Spawns the watcher of one controller and, once its cache has synced,
    /// the reconcile workers.
    fn spawn_controller<K, R>(&mut self, handle: ControllerHandle<K, R>)
    where
        K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
        R: Reconcile + 'static,
    {
        let ControllerHandle {
            watcher,
            cache,
            runtime,
        } = handle;
        let kind = K::kind(&()).to_string();

        let watcher_task = {
            let token = self.cancellation_token.clone();
            let kind = kind.clone();
            tokio::spawn(async move {
                tracing::info!("Starting {kind} watcher task");
                watcher.run(token).await;
                tracing::info!("{kind} watcher task completed");
            })
        };
        self.tasks.push(watcher_task);

        let worker_task = {
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                tracing::info!("Waiting for {kind} cache to sync");
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("{kind} workers cancelled before cache sync");
                        return;
                    }
                    ready = cache.wait_until_ready() => {
                        if let Err(e) = ready {
                            tracing::error!("{kind} cache never became ready: {e}");
                            return;
                        }
                    }
                }
                tracing::info!("Starting {kind} worker task");
                runtime.run(token).await;
                tracing::info!("{kind} worker task completed");
            })
        };
        self.tasks.push(worker_task);
    }
}
