//! Namespaced object keys carried through the work queues.

use core::error::Error;
use std::fmt;

use kube::runtime::reflector::ObjectRef;
use kube::Resource;
use kube::ResourceExt;

/// Identity of a namespaced object, rendered as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

/// Errors produced when an object cannot be turned into a key.
#[derive(Debug, derive_more::Display, PartialEq, Eq)]
pub enum KeyError {
    #[display("object has no name")]
    MissingName,
    #[display("object {name} has no namespace")]
    MissingNamespace { name: String },
}

impl Error for KeyError {}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Derives the key of a namespaced object from its metadata.
    pub fn for_object<K: Resource>(obj: &K) -> Result<Self, KeyError> {
        let name = obj.meta().name.clone().ok_or(KeyError::MissingName)?;
        let namespace = obj
            .namespace()
            .ok_or_else(|| KeyError::MissingNamespace { name: name.clone() })?;
        Ok(Self { namespace, name })
    }

    /// Reflector store reference for this key.
    pub fn object_ref<K>(&self) -> ObjectRef<K>
    where
        K: Resource,
        K::DynamicType: Default,
    {
        ObjectRef::new(&self.name).within(&self.namespace)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
