//! # Message Dispatcher
//!
//! Executes one decoded message against the instance table, resolving members
//! through a `TypeCatalog`.
//!
//! ## Invariants
//!
//! - Invoke and field reads always produce a reply; a failure is a
//!   `Reply::Err` carrying the reason.
//! - Construct, field writes and finalize never produce a reply. Their
//!   failures are logged and go no further.
//! - Nothing here panics on a bad message.

use std::sync::Arc;

use xdrpc::AccessMode;
use xdrpc::Construct;
use xdrpc::FailureReason;
use xdrpc::FieldAccess;
use xdrpc::Finalize;
use xdrpc::Invoke;
use xdrpc::Message;
use xdrpc::Reply;
use xdrpc::Scope;
use xdrpc::Value;

use crate::catalog;
use crate::catalog::TypeCatalog;
use crate::names;
use crate::names::Endpoint;
use crate::names::NameService;
use crate::table;
use crate::table::InstanceKey;
use crate::table::InstanceTable;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Catalog(catalog::Error),
    Table(table::Error),
}

impl Error {
    pub fn reason(&self) -> FailureReason {
        match self {
            Error::Catalog(e) => e.reason(),
            Error::Table(table::Error::HandleNotFound(_)) => FailureReason::HandleNotFound,
            Error::Table(e @ table::Error::Conflict(_)) => FailureReason::InvocationFailed(e.to_string()),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Catalog(e) => write!(f, "{}", e),
            Self::Table(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Catalog(e) => Some(e),
            Self::Table(e) => Some(e),
        }
    }
}

impl From<catalog::Error> for Error {
    fn from(e: catalog::Error) -> Self {
        Self::Catalog(e)
    }
}

impl From<table::Error> for Error {
    fn from(e: table::Error) -> Self {
        Self::Table(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Dispatcher {
    catalog: Arc<dyn TypeCatalog>,
    table: Arc<InstanceTable>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<dyn TypeCatalog>) -> Self {
        Self::with_table(catalog, Arc::new(InstanceTable::new()))
    }

    pub fn with_table(catalog: Arc<dyn TypeCatalog>, table: Arc<InstanceTable>) -> Self {
        Self { catalog, table }
    }

    pub fn table(&self) -> &Arc<InstanceTable> {
        &self.table
    }

    /// Binds this dispatcher on `names` so direct transports can reach it.
    pub fn export(self: &Arc<Self>, names: &NameService, name: &str) -> names::Result<()> {
        names.bind(name, self.clone())?;
        tracing::info!(endpoint = %name, "exported dispatcher");
        Ok(())
    }

    /// Executes `message`, returning the reply if the message expects one.
    pub fn dispatch(&self, message: &Message) -> Option<Reply> {
        match message {
            Message::Construct(m) => {
                if let Err(e) = self.construct(m) {
                    tracing::warn!(class = %m.class_name, handle = %m.handle, error = %e, "construct failed");
                }
                None
            }
            Message::Invoke(m) => Some(self.reply("invoke", &m.class_name, self.invoke(m))),
            Message::FieldAccess(m) => match m.mode {
                AccessMode::Read => Some(self.reply("read-field", &m.class_name, self.read_field(m))),
                AccessMode::Write => {
                    if let Err(e) = self.write_field(m) {
                        tracing::warn!(class = %m.class_name, field = %m.field_name, error = %e, "field write failed");
                    }
                    None
                }
            },
            Message::Finalize(m) => {
                if let Err(e) = self.finalize(m) {
                    tracing::warn!(class = %m.class_name, handle = %m.handle, error = %e, "finalize failed");
                }
                None
            }
        }
    }

    fn reply(&self, what: &str, class_name: &str, result: Result<Value>) -> Reply {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(e) => {
                tracing::warn!(class = %class_name, error = %e, "{} failed", what);
                Reply::Err(e.reason())
            }
        }
    }

    fn construct(&self, m: &Construct) -> Result<()> {
        let key = InstanceKey::new(&m.class_name, m.handle);
        if self.table.contains(&key) {
            tracing::warn!(class = %m.class_name, handle = %m.handle, "object already exists");
            return Ok(());
        }

        let ctor = self.catalog.resolve_constructor(&m.class_name, &m.arg_types)?;
        let instance = ctor.construct(&m.args)?;

        match self.table.insert(key, instance) {
            Ok(()) => {
                tracing::info!(class = %m.class_name, handle = %m.handle, "constructed");
                Ok(())
            }
            Err(table::Error::Conflict(_)) => {
                tracing::warn!(class = %m.class_name, handle = %m.handle, "object already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn invoke(&self, m: &Invoke) -> Result<Value> {
        tracing::debug!(class = %m.class_name, handle = %m.handle, method = %m.method_name, "invoke");

        if m.handle.is_static() {
            let method = self
                .catalog
                .resolve_method(&m.class_name, &m.method_name, &m.arg_types, Scope::Static)?;
            return Ok(method.invoke_static(&m.args)?);
        }

        let key = InstanceKey::new(&m.class_name, m.handle);
        let value = self.table.with_instance(&key, |obj| {
            let method = self
                .catalog
                .resolve_method(&m.class_name, &m.method_name, &m.arg_types, Scope::Instance)?;
            method.invoke(obj, &m.args)
        })??;
        Ok(value)
    }

    fn read_field(&self, m: &FieldAccess) -> Result<Value> {
        tracing::debug!(class = %m.class_name, handle = %m.handle, field = %m.field_name, "read field");

        if m.scope == Scope::Static {
            let field = self.catalog.resolve_field(&m.class_name, &m.field_name, Scope::Static)?;
            return Ok(field.read(None)?);
        }

        let key = InstanceKey::new(&m.class_name, m.handle);
        let value = self.table.with_instance(&key, |obj| {
            let field = self.catalog.resolve_field(&m.class_name, &m.field_name, Scope::Instance)?;
            field.read(Some(&*obj))
        })??;
        Ok(value)
    }

    fn write_field(&self, m: &FieldAccess) -> Result<()> {
        tracing::debug!(class = %m.class_name, handle = %m.handle, field = %m.field_name, "write field");

        let value = m.value.clone().unwrap_or(Value::Null);

        if m.scope == Scope::Static {
            let field = self.catalog.resolve_field(&m.class_name, &m.field_name, Scope::Static)?;
            return Ok(field.write(None, value)?);
        }

        let key = InstanceKey::new(&m.class_name, m.handle);
        self.table.with_instance(&key, |obj| {
            let field = self.catalog.resolve_field(&m.class_name, &m.field_name, Scope::Instance)?;
            field.write(Some(obj), value)
        })??;
        Ok(())
    }

    fn finalize(&self, m: &Finalize) -> Result<()> {
        let key = InstanceKey::new(&m.class_name, m.handle);
        self.table.remove(&key)?;
        tracing::info!(class = %m.class_name, handle = %m.handle, "finalized");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Endpoint for Dispatcher {
    async fn call(&self, message: Message) -> Option<Reply> {
        if let Err(e) = message.validate() {
            tracing::warn!(class = %message.class_name(), error = %e, "rejected malformed message");
            return (!message.is_one_way()).then_some(Reply::Err(FailureReason::Unsupported));
        }
        self.dispatch(&message)
    }
}
