//! Kubernetes-backed implementations of the store, cache and event source traits

pub mod stores;
pub mod types;
pub mod watcher;

pub use stores::KubePodStore;
pub use stores::KubeResourceStore;
pub use types::KubernetesError;
pub use watcher::ResourceWatcher;
