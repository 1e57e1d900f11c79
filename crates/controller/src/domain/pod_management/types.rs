use core::error::Error;

use k8s_openapi::api::core::v1::Pod;

/// Label tying a worker pod to the name of the resource that created it.
pub const OWNER_LABEL: &str = "controller";

/// Environment variable carrying the owner's message into the container.
pub const MESSAGE_ENV: &str = "MESSAGE";

pub const PHASE_RUNNING: &str = "Running";
pub const PHASE_SUCCEEDED: &str = "Succeeded";
pub const PHASE_FAILED: &str = "Failed";

/// Errors raised by the pod lifecycle manager.
#[derive(Debug, derive_more::Display)]
pub enum PodError {
    #[display("failed to list pods owned by {owner}")]
    List { owner: String },
    #[display("failed to create pod for {owner}")]
    Create { owner: String },
    #[display("pod name collided {attempts} times in a row for {owner}")]
    NameCollision { owner: String, attempts: u32 },
    #[display("failed to delete pod {namespace}/{name}")]
    Delete { namespace: String, name: String },
    #[display("{owner} cannot own pods: {message}")]
    InvalidOwner { owner: String, message: String },
}

impl Error for PodError {}

impl PodError {
    /// Whether a later attempt may succeed without any change to the owner.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::List { .. } | Self::Create { .. } | Self::Delete { .. }
        )
    }
}

/// Pod selection used when counting owned pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PodFilter {
    /// `Running` and not marked for deletion
    #[display("running")]
    Running,
    /// `Succeeded` and not marked for deletion
    #[display("completed")]
    Completed,
    /// not marked for deletion and not `Failed`
    #[display("active")]
    Active,
}

impl PodFilter {
    pub fn matches(&self, pod: &Pod) -> bool {
        if is_terminating(pod) {
            return false;
        }
        let phase = pod_phase(pod);
        match self {
            Self::Running => phase == Some(PHASE_RUNNING),
            Self::Completed => phase == Some(PHASE_SUCCEEDED),
            Self::Active => phase != Some(PHASE_FAILED),
        }
    }
}

pub fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|status| status.phase.as_deref())
}

/// Pod has a deletion timestamp set.
pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Label selector matching every pod owned by `owner_name`.
pub fn owner_selector(owner_name: &str) -> String {
    format!("{OWNER_LABEL}={owner_name}")
}
