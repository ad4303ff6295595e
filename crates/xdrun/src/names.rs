//! # Name Service
//!
//! An in-memory registry of named endpoints. A server exports its dispatcher
//! under a well-known name; the direct transport looks that name up once and
//! then calls the endpoint in-process.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use xdrpc::Message;
use xdrpc::Reply;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    AlreadyBound(String),
    NotBound(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyBound(name) => write!(f, "Name already bound: {}", name),
            Self::NotBound(name) => write!(f, "Name not bound: {}", name),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Something that executes messages on behalf of a direct caller.
#[async_trait::async_trait]
pub trait Endpoint: Send + Sync + 'static {
    /// Runs `message` to completion. Returns `None` for one-way messages.
    async fn call(&self, message: Message) -> Option<Reply>;
}

#[derive(Default)]
pub struct NameService {
    bindings: DashMap<String, Arc<dyn Endpoint>>,
}

impl NameService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name`, failing if it is already taken.
    pub fn bind(&self, name: impl Into<String>, endpoint: Arc<dyn Endpoint>) -> Result<()> {
        match self.bindings.entry(name.into()) {
            Entry::Occupied(e) => Err(Error::AlreadyBound(e.key().clone())),
            Entry::Vacant(e) => {
                tracing::debug!(name = %e.key(), "bound endpoint");
                e.insert(endpoint);
                Ok(())
            }
        }
    }

    /// Binds `name`, replacing any previous endpoint.
    pub fn rebind(&self, name: impl Into<String>, endpoint: Arc<dyn Endpoint>) {
        let name = name.into();
        tracing::debug!(name = %name, "rebound endpoint");
        self.bindings.insert(name, endpoint);
    }

    pub fn unbind(&self, name: &str) -> Result<Arc<dyn Endpoint>> {
        self.bindings
            .remove(name)
            .map(|(_, endpoint)| endpoint)
            .ok_or_else(|| Error::NotBound(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Endpoint>> {
        self.bindings
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotBound(name.to_string()))
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}
