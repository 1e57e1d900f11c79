pub mod key;
pub mod pod_management;
pub mod reconcile;
pub mod runtime;
pub mod store;
pub mod workqueue;

#[cfg(test)]
pub(crate) mod mock;
