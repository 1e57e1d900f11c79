//! Writes observed counts back to a resource's status sub-resource.

use core::error::Error;
use std::marker::PhantomData;
use std::sync::Arc;

use api_types::Workload;
use api_types::WorkloadStatus;
use error_stack::Report;
use error_stack::ResultExt;
use tracing::info;

use crate::domain::key::ObjectKey;
use crate::domain::store::ResourceStore;
use crate::domain::store::StoreError;

#[derive(Debug, derive_more::Display)]
pub enum StatusError {
    #[display("failed to fetch {key} before writing status")]
    Fetch { key: ObjectKey },
    #[display("{key} no longer exists")]
    Gone { key: ObjectKey },
    #[display("status of {key} was changed concurrently")]
    Conflict { key: ObjectKey },
    #[display("failed to write status of {key}")]
    Write { key: ObjectKey },
}

impl Error for StatusError {}

/// Fetch-modify-write of the status of one resource kind.
pub struct StatusReporter<K, R> {
    store: Arc<R>,
    _kind: PhantomData<fn() -> K>,
}

impl<K, R> StatusReporter<K, R>
where
    K: Workload + Send + Sync,
    R: ResourceStore<K>,
{
    pub fn new(store: Arc<R>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    /// Sets the status of `key` to `{count, message}` on its latest version and
    /// returns the written object.
    ///
    /// # Errors
    ///
    /// - [`StatusError::Gone`] if the object was deleted meanwhile
    /// - [`StatusError::Conflict`] if another writer updated it between the read and the write
    /// - [`StatusError::Fetch`] / [`StatusError::Write`] on any other store failure
    pub async fn report(
        &self,
        key: &ObjectKey,
        count: u32,
        message: &str,
    ) -> Result<K, Report<StatusError>> {
        let mut latest = self
            .store
            .get(key)
            .await
            .change_context_lazy(|| StatusError::Fetch { key: key.clone() })?
            .ok_or_else(|| Report::new(StatusError::Gone { key: key.clone() }))?;

        let status = WorkloadStatus {
            message: message.to_string(),
            count,
        };
        if latest.observed() == status {
            return Ok(latest);
        }
        latest.set_observed(status);

        match self.store.replace_status(&latest).await {
            Ok(written) => {
                info!(key = %key, count, message, "status updated");
                Ok(written)
            }
            Err(report) => {
                let key = key.clone();
                let context = match report.current_context() {
                    StoreError::Conflict { .. } => StatusError::Conflict { key },
                    StoreError::NotFound { .. } => StatusError::Gone { key },
                    _ => StatusError::Write { key },
                };
                Err(report.change_context(context))
            }
        }
    }
}
