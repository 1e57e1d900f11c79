//! Worker pod templates.

use std::collections::BTreeMap;

use api_types::Workload;
use error_stack::Report;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::ResourceExt;

use super::types::PodError;
use super::types::MESSAGE_ENV;
use super::types::OWNER_LABEL;

const CONTAINER_NAME: &str = "static-nginx";
const CONTAINER_IMAGE: &str = "nginx:latest";

/// How the worker container behaves once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodTemplate {
    /// Echoes the message forever; used by `TrackPod` groups.
    LongRunning,
    /// Echoes the message once and exits; used by `TaskRun` fan-out.
    RunToCompletion,
}

impl PodTemplate {
    fn script(&self) -> &'static str {
        match self {
            Self::LongRunning => "while true; do echo '$(MESSAGE)'; sleep 10; done",
            Self::RunToCompletion => "echo '$(MESSAGE)'",
        }
    }

    fn restart_policy(&self) -> Option<String> {
        match self {
            Self::LongRunning => None,
            Self::RunToCompletion => Some("Never".to_string()),
        }
    }
}

/// Everything needed to stamp out pods on behalf of one owning resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PodOwner {
    pub name: String,
    pub namespace: String,
    pub message: String,
    pub owner_ref: OwnerReference,
    pub template: PodTemplate,
}

impl PodOwner {
    /// Captures the identity and desired message of `resource`.
    ///
    /// # Errors
    ///
    /// - [`PodError::InvalidOwner`] if the resource has no namespace, name or uid
    pub fn from_resource<K>(resource: &K, template: PodTemplate) -> Result<Self, Report<PodError>>
    where
        K: Resource<DynamicType = ()> + Workload,
    {
        let name = resource.name_any();
        let invalid = |message: &str| PodError::InvalidOwner {
            owner: name.clone(),
            message: message.to_string(),
        };

        let namespace = resource
            .namespace()
            .ok_or_else(|| Report::new(invalid("missing namespace")))?;
        let owner_ref = resource
            .controller_owner_ref(&())
            .ok_or_else(|| Report::new(invalid("missing name or uid")))?;

        Ok(Self {
            name: name.clone(),
            namespace,
            message: resource.message().to_string(),
            owner_ref,
            template,
        })
    }

    /// Builds the pod manifest named `pod_name` for this owner.
    pub fn build_pod(&self, pod_name: &str) -> Pod {
        let labels = BTreeMap::from([(OWNER_LABEL.to_string(), self.name.clone())]);

        Pod {
            metadata: ObjectMeta {
                name: Some(pod_name.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                owner_references: Some(vec![self.owner_ref.clone()]),
                ..Default::default()
            },
            spec: Some(PodSpec {
                restart_policy: self.template.restart_policy(),
                containers: vec![Container {
                    name: CONTAINER_NAME.to_string(),
                    image: Some(CONTAINER_IMAGE.to_string()),
                    env: Some(vec![EnvVar {
                        name: MESSAGE_ENV.to_string(),
                        value: Some(self.message.clone()),
                        ..Default::default()
                    }]),
                    command: Some(vec!["/bin/sh".to_string()]),
                    args: Some(vec!["-c".to_string(), self.template.script().to_string()]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: None,
        }
    }
}
