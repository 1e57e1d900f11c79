//! Pure decision table mapping desired and observed state to pod actions.

use std::cmp::Reverse;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::domain::pod_management::types::is_terminating;
use crate::domain::pod_management::PodFilter;

/// Which branch of the decision table applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Action {
    /// Message changed: replace the whole group
    #[display("recreate")]
    Recreate,
    #[display("scale-up")]
    ScaleUp,
    #[display("scale-down")]
    ScaleDown,
    #[display("in-sync")]
    InSync,
}

/// Pod mutations for one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub action: Action,
    /// Names of pods to delete, in deletion order
    pub deletes: Vec<String>,
    /// Number of fresh pods to create after the deletes
    pub creates: u32,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        self.deletes.is_empty() && self.creates == 0
    }
}

/// Decides how to converge a long-running group.
///
/// Evaluated in priority order:
/// 1. `observed_message` differs from `desired_message`: delete every live
///    owned pod and create `desired_count` new ones
/// 2. fewer running pods than desired: create the difference
/// 3. more running pods than desired: delete the newest running pods
/// 4. otherwise nothing to do
///
/// A group that never had its status written has an empty observed message,
/// so its first pass takes the recreate branch with nothing to delete.
pub fn plan(
    desired_message: &str,
    observed_message: &str,
    desired_count: u32,
    pods: &[Pod],
) -> Plan {
    if observed_message != desired_message {
        let deletes = pods
            .iter()
            .filter(|pod| !is_terminating(pod))
            .map(ResourceExt::name_any)
            .collect();
        return Plan {
            action: Action::Recreate,
            deletes,
            creates: desired_count,
        };
    }

    let mut running: Vec<&Pod> = pods
        .iter()
        .filter(|pod| PodFilter::Running.matches(pod))
        .collect();
    let running_count = u32::try_from(running.len()).unwrap_or(u32::MAX);

    if running_count < desired_count {
        return Plan {
            action: Action::ScaleUp,
            deletes: Vec::new(),
            creates: desired_count - running_count,
        };
    }

    if running_count > desired_count {
        running.sort_by_key(|pod| {
            (
                Reverse(pod.creation_timestamp().map(|t| t.0)),
                pod.name_any(),
            )
        });
        let excess = (running_count - desired_count) as usize;
        return Plan {
            action: Action::ScaleDown,
            deletes: running
                .into_iter()
                .take(excess)
                .map(ResourceExt::name_any)
                .collect(),
            creates: 0,
        };
    }

    Plan {
        action: Action::InSync,
        deletes: Vec::new(),
        creates: 0,
    }
}
