//! # Remote Instance Table
//!
//! The server's live objects, keyed by the class name and handle the client
//! chose. A key is bound once: a second insert under the same key is a
//! conflict and the first instance stays.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use xdrpc::Handle;

use crate::catalog::Instance;
use crate::catalog::Object;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub class_name: String,
    pub handle: Handle,
}

impl InstanceKey {
    pub fn new(class_name: impl Into<String>, handle: Handle) -> Self {
        Self {
            class_name: class_name.into(),
            handle,
        }
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.class_name, self.handle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HandleNotFound(InstanceKey),
    Conflict(InstanceKey),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandleNotFound(key) => write!(f, "No instance for {}", key),
            Self::Conflict(key) => write!(f, "Instance already exists for {}", key),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Default)]
pub struct InstanceTable {
    instances: DashMap<InstanceKey, Instance>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `instance` to `key`. Never overwrites.
    pub fn insert(&self, key: InstanceKey, instance: Instance) -> Result<()> {
        match self.instances.entry(key) {
            Entry::Occupied(e) => Err(Error::Conflict(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(instance);
                Ok(())
            }
        }
    }

    /// Runs `f` with exclusive access to the instance under `key`.
    pub fn with_instance<R>(&self, key: &InstanceKey, f: impl FnOnce(&mut Object) -> R) -> Result<R> {
        let mut entry = self
            .instances
            .get_mut(key)
            .ok_or_else(|| Error::HandleNotFound(key.clone()))?;
        Ok(f(entry.value_mut().as_mut()))
    }

    pub fn remove(&self, key: &InstanceKey) -> Result<Instance> {
        self.instances
            .remove(key)
            .map(|(_, instance)| instance)
            .ok_or_else(|| Error::HandleNotFound(key.clone()))
    }

    pub fn contains(&self, key: &InstanceKey) -> bool {
        self.instances.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
