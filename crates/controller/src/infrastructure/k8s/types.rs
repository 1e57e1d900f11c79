use core::error::Error;

use error_stack::Report;

use crate::domain::store::StoreError;

/// Errors that can occur while talking to the Kubernetes API.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to watch {kind}: {message}")]
    WatchFailed { kind: String, message: String },
}

impl Error for KubernetesError {}

/// Maps a kube client error onto the store error classes used by the reconcilers.
///
/// 404 is `NotFound`; 409 is `AlreadyExists` when the API server says so and
/// `Conflict` otherwise.
pub(crate) fn classify_api_error(error: kube::Error, kind: &str, key: &str) -> Report<StoreError> {
    let kind = kind.to_string();
    let key = key.to_string();
    let context = match &error {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound { kind, key },
        kube::Error::Api(response)
            if response.code == 409 && response.reason == "AlreadyExists" =>
        {
            StoreError::AlreadyExists { kind, key }
        }
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict { kind, key },
        other => StoreError::Api {
            message: other.to_string(),
        },
    };
    Report::new(error).change_context(context)
}
