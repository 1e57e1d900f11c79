//! Polling wait for an owner's pods to reach a target count.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::domain::pod_management::PodFilter;
use crate::domain::pod_management::PodLifecycleManager;
use crate::domain::store::PodStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// How a wait ended, with the last count observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Converged { observed: u32 },
    TimedOut { observed: u32 },
    Cancelled { observed: u32 },
}

impl WaitOutcome {
    pub fn observed(&self) -> u32 {
        match *self {
            Self::Converged { observed }
            | Self::TimedOut { observed }
            | Self::Cancelled { observed } => observed,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

pub struct ConvergenceWaiter<S> {
    pods: PodLifecycleManager<S>,
    config: WaitConfig,
}

impl<S: PodStore> ConvergenceWaiter<S> {
    pub fn new(pods: PodLifecycleManager<S>, config: WaitConfig) -> Self {
        Self { pods, config }
    }

    /// Polls the number of `owner_name`'s pods matching `filter` until it
    /// equals `desired`, the timeout elapses or `cancel` fires.
    ///
    /// The first poll happens immediately. A failed poll is logged and the
    /// previous observation is kept.
    #[tracing::instrument(skip(self, cancel), fields(timeout = ?self.config.timeout))]
    pub async fn wait_for_count(
        &self,
        namespace: &str,
        owner_name: &str,
        filter: PodFilter,
        desired: u32,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let deadline = Instant::now() + self.config.timeout;
        let mut observed = 0;

        loop {
            match self.pods.count(namespace, owner_name, filter).await {
                Ok(count) => {
                    observed = count;
                    if count == desired {
                        debug!(observed, "pods converged");
                        return WaitOutcome::Converged { observed };
                    }
                }
                Err(e) => warn!("failed to poll pod count: {e:?}"),
            }

            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut { observed };
            }
            let pause = self.config.poll_interval.min(deadline - now);

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(observed, "wait cancelled");
                    return WaitOutcome::Cancelled { observed };
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
