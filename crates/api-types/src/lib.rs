//! Custom resource definitions
//!
//! This crate contains the custom resources reconciled by the trackpod
//! controllers: the single-level [`TrackPod`] worker group and the two-level
//! [`PipelineRun`] / [`TaskRun`] pair. All three share the same spec shape
//! (`message`, `count`) and the same [`WorkloadStatus`].

use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// API group shared by every resource in this crate.
pub const GROUP: &str = "aj.com";

/// Observed state written back by the controllers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub count: u32,
}

impl WorkloadStatus {
    pub fn new(message: impl Into<String>, count: u32) -> Self {
        Self {
            message: message.into(),
            count,
        }
    }
}

/// A group of long-running worker pods, each echoing `message`.
///
/// Example:
/// ```yaml
/// apiVersion: aj.com/v1
/// kind: TrackPod
/// metadata:
///   name: greeter
///   namespace: default
/// spec:
///   message: hello
///   count: 3
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "aj.com",
    version = "v1",
    kind = "TrackPod",
    namespaced,
    status = "WorkloadStatus",
    shortname = "tpod",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".spec.message"}"#,
    printcolumn = r#"{"name":"Count","type":"integer","jsonPath":".spec.count"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.count"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TrackPodSpec {
    /// Payload injected into every worker pod as `MESSAGE`
    #[serde(default)]
    pub message: String,
    /// Number of running worker pods wanted
    #[serde(default)]
    pub count: u32,
}

/// Top-level pipeline resource. Every observed spec/status mismatch fans out
/// into exactly one [`TaskRun`] for the current generation.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "aj.com",
    version = "v1alpha1",
    kind = "PipelineRun",
    namespaced,
    status = "WorkloadStatus",
    shortname = "prun",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".spec.message"}"#,
    printcolumn = r#"{"name":"Count","type":"integer","jsonPath":".spec.count"}"#,
    printcolumn = r#"{"name":"Completed","type":"integer","jsonPath":".status.count"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpec {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub count: u32,
}

/// Child of a [`PipelineRun`] owning a bounded set of run-to-completion pods.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "aj.com",
    version = "v1alpha1",
    kind = "TaskRun",
    namespaced,
    status = "WorkloadStatus",
    shortname = "trun",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".spec.message"}"#,
    printcolumn = r#"{"name":"Count","type":"integer","jsonPath":".spec.count"}"#,
    printcolumn = r#"{"name":"Completed","type":"integer","jsonPath":".status.count"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TaskRunSpec {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub count: u32,
}

impl From<&PipelineRunSpec> for TaskRunSpec {
    fn from(spec: &PipelineRunSpec) -> Self {
        Self {
            message: spec.message.clone(),
            count: spec.count,
        }
    }
}

/// Uniform access to the desired (`spec`) and observed (`status`) halves of
/// the resources in this crate.
pub trait Workload {
    /// Desired payload message
    fn message(&self) -> &str;

    /// Desired pod count
    fn count(&self) -> u32;

    /// Current status, or the empty status when none has been written yet
    fn observed(&self) -> WorkloadStatus;

    fn set_observed(&mut self, status: WorkloadStatus);

    /// Whether the recorded status already matches the spec.
    fn is_settled(&self) -> bool {
        let observed = self.observed();
        observed.message == self.message() && observed.count == self.count()
    }
}

macro_rules! impl_workload {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl Workload for $kind {
                fn message(&self) -> &str {
                    &self.spec.message
                }

                fn count(&self) -> u32 {
                    self.spec.count
                }

                fn observed(&self) -> WorkloadStatus {
                    self.status.clone().unwrap_or_default()
                }

                fn set_observed(&mut self, status: WorkloadStatus) {
                    self.status = Some(status);
                }
            }
        )+
    };
}

impl_workload!(TrackPod, PipelineRun, TaskRun);

#[cfg(test)]
mod tests {
    use kube::CustomResourceExt;
    use kube::Resource;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn deserialize_trackpod_wire_format() {
        let json = r#"{
            "apiVersion": "aj.com/v1",
            "kind": "TrackPod",
            "metadata": { "name": "greeter", "namespace": "default" },
            "spec": { "message": "hello", "count": 3 },
            "status": { "message": "hello", "count": 2 }
        }"#;

        let tpod: TrackPod = serde_json::from_str(json).expect("should parse TrackPod");

        assert_eq!(tpod.spec.message, "hello");
        assert_eq!(tpod.spec.count, 3);
        assert_eq!(tpod.observed(), WorkloadStatus::new("hello", 2));
        assert!(!tpod.is_settled());
    }

    #[test]
    fn missing_status_reads_as_empty() {
        let prun = PipelineRun::new(
            "build",
            PipelineRunSpec {
                message: "compile".to_string(),
                count: 2,
            },
        );

        assert_eq!(prun.observed(), WorkloadStatus::default());
        assert!(!prun.is_settled());
    }

    #[test]
    fn empty_spec_without_status_is_settled() {
        let trun = TaskRun::new("noop", TaskRunSpec::default());
        assert!(trun.is_settled());
    }

    #[test]
    fn set_observed_settles_resource() {
        let mut tpod = TrackPod::new(
            "greeter",
            TrackPodSpec {
                message: "hi".to_string(),
                count: 1,
            },
        );
        tpod.set_observed(WorkloadStatus::new("hi", 1));
        assert!(tpod.is_settled());
    }

    #[test]
    fn task_run_spec_copies_pipeline_spec() {
        let spec = PipelineRunSpec {
            message: "payload".to_string(),
            count: 4,
        };
        assert_eq!(
            TaskRunSpec::from(&spec),
            TaskRunSpec {
                message: "payload".to_string(),
                count: 4,
            }
        );
    }

    #[test]
    fn crd_metadata() {
        assert_eq!(TrackPod::crd_name(), "trackpods.aj.com");
        assert_eq!(PipelineRun::crd_name(), "pipelineruns.aj.com");
        assert_eq!(TaskRun::api_version(&()), "aj.com/v1alpha1");
        assert_eq!(TrackPod::group(&()), GROUP);

        let crd = TaskRun::crd();
        let version = &crd.spec.versions[0];
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }
}
