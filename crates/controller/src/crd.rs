//! Custom resource definition manifests.

use api_types::PipelineRun;
use api_types::TaskRun;
use api_types::TrackPod;
use kube::CustomResourceExt;

/// All custom resource definitions as a multi-document YAML stream.
///
/// # Errors
///
/// Returns the serializer error if a definition cannot be rendered.
pub fn manifests() -> Result<String, serde_yaml::Error> {
    let crds = [TrackPod::crd(), PipelineRun::crd(), TaskRun::crd()];
    let mut out = String::new();
    for crd in &crds {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(crd)?);
    }
    Ok(out)
}
