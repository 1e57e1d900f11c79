pub mod app;
pub mod config;
pub mod crd;
mod domain;
mod infrastructure;

// Re-export main modules
pub use domain::key;
pub use domain::pod_management;
pub use domain::reconcile;
pub use domain::runtime;
pub use domain::store;
pub use domain::workqueue;
pub use infrastructure::k8s;
pub use infrastructure::kube_client;
