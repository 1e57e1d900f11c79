//! Pod management: templates, ownership labels and the lifecycle manager

pub mod lifecycle;
pub mod template;
pub mod types;

// Re-export commonly used types
pub use lifecycle::CreateRetry;
pub use lifecycle::PodLifecycleManager;
pub use template::PodOwner;
pub use template::PodTemplate;
pub use types::PodError;
pub use types::PodFilter;
pub use types::OWNER_LABEL;
