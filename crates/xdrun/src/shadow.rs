//! # Remote Invocation Façade
//!
//! The surface an interception layer calls in place of a real constructor,
//! method or field on an object that lives across the boundary.
//!
//! ## Philosophy
//!
//! - **Two forms per operation**: `try_*` returns a structured `Error`.
//!   The plain form logs the failure and degrades to `None` or `()`, so a
//!   caller that treats the remote object like a local one never sees an
//!   error it cannot handle.
//! - **One message, one check, one call**: each operation builds exactly one
//!   message, validates its shape, asks the policy once, and makes at most
//!   one transport call.
//! - **Transport chosen once**: `ShadowBuilder::build` picks the transport from
//!   the config; the façade never switches at runtime.
//!
//! Construct, field writes and finalize are one-way. Invoke and field reads
//! wait for their reply.

use std::sync::Arc;

use xdrpc::FailureReason;
use xdrpc::Handle;
use xdrpc::Message;
use xdrpc::TypeTag;
use xdrpc::Value;

use crate::config::Config;
use crate::config::TransportKind;
use crate::correlated::CorrelatedTransport;
use crate::direct::DirectTransport;
use crate::fabric::Fabric;
use crate::names::NameService;
use crate::policy::AllowAll;
use crate::policy::Policy;
use crate::registry;
use crate::registry::ClientRegistry;
use crate::registry::ObjectKey;
use crate::registry::Registration;
use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub enum Error {
    /// The remote endpoint could not be reached.
    TransportUnavailable(String),
    Transport(transport::Error),
    /// The local object has no handle for this class.
    HandleNotFound { class_name: String },
    PermissionDenied { operation: xdrpc::Kind, class_name: String },
    /// The registry has no handles left to issue.
    HandlesExhausted,
    /// The remote side answered with a failure.
    Remote(FailureReason),
    Rpc(xdrpc::Error),
    /// The builder lacks a collaborator the configured transport needs.
    Misconfigured(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportUnavailable(msg) => write!(f, "Transport unavailable: {}", msg),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::HandleNotFound { class_name } => write!(f, "No handle for {} object", class_name),
            Self::PermissionDenied { operation, class_name } => {
                write!(f, "Policy denied {} on {}", operation, class_name)
            }
            Self::HandlesExhausted => write!(f, "No handles left to issue"),
            Self::Remote(reason) => write!(f, "Remote failure: {}", reason),
            Self::Rpc(e) => write!(f, "RPC error: {}", e),
            Self::Misconfigured(msg) => write!(f, "Misconfigured: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Rpc(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        match e {
            transport::Error::Unavailable(msg) => Self::TransportUnavailable(msg),
            transport::Error::Rpc(e) => Self::Rpc(e),
            other => Self::Transport(other),
        }
    }
}

impl From<registry::Error> for Error {
    fn from(e: registry::Error) -> Self {
        match e {
            registry::Error::HandleNotFound { class_name } => Self::HandleNotFound { class_name },
            registry::Error::HandlesExhausted => Self::HandlesExhausted,
        }
    }
}

impl From<xdrpc::Error> for Error {
    fn from(e: xdrpc::Error) -> Self {
        Self::Rpc(e)
    }
}

impl Error {
    /// True for failures normal use runs into, as opposed to a broken runtime.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::HandleNotFound { .. } | Self::PermissionDenied { .. } | Self::Remote(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct ShadowBuilder {
    config: Config,
    names: Option<Arc<NameService>>,
    fabric: Option<Arc<dyn Fabric>>,
    transport: Option<Arc<dyn Transport>>,
    policy: Arc<dyn Policy>,
    registry: Option<Arc<ClientRegistry>>,
}

impl ShadowBuilder {
    /// Name service the direct transport resolves its endpoint on.
    pub fn names(mut self, names: Arc<NameService>) -> Self {
        self.names = Some(names);
        self
    }

    /// Fabric the correlated transport sends on.
    pub fn fabric(mut self, fabric: Arc<dyn Fabric>) -> Self {
        self.fabric = Some(fabric);
        self
    }

    /// Uses `transport` as is, ignoring the configured kind.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policy = policy;
        self
    }

    /// Shares an existing registry instead of starting a fresh one.
    pub fn registry(mut self, registry: Arc<ClientRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<Shadow> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => match self.config.transport {
                TransportKind::Direct => {
                    let names = self
                        .names
                        .ok_or_else(|| Error::Misconfigured("direct transport needs a name service".into()))?;
                    Arc::new(DirectTransport::new(names, self.config.endpoint_name.clone())) as Arc<dyn Transport>
                }
                TransportKind::Correlated => {
                    let fabric = self
                        .fabric
                        .ok_or_else(|| Error::Misconfigured("correlated transport needs a fabric".into()))?;
                    let mut transport = CorrelatedTransport::new(fabric);
                    if let Some(timeout) = self.config.recv_timeout {
                        transport = transport.with_recv_timeout(timeout);
                    }
                    Arc::new(transport) as Arc<dyn Transport>
                }
            },
        };

        tracing::debug!(
            enclave = %self.config.enclave,
            transport = %self.config.transport,
            "built shadow"
        );

        Ok(Shadow {
            config: self.config,
            transport,
            registry: self.registry.unwrap_or_default(),
            policy: self.policy,
        })
    }
}

pub struct Shadow {
    config: Config,
    transport: Arc<dyn Transport>,
    registry: Arc<ClientRegistry>,
    policy: Arc<dyn Policy>,
}

impl Shadow {
    pub fn builder(config: Config) -> ShadowBuilder {
        ShadowBuilder {
            config,
            names: None,
            fabric: None,
            transport: None,
            policy: Arc::new(AllowAll),
            registry: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Shape first, then policy.
    fn check(&self, message: &Message) -> Result<()> {
        message.validate()?;
        self.authorize(message)
    }

    fn authorize(&self, message: &Message) -> Result<()> {
        let operation = message.kind();
        if self.policy.can_perform(operation, message) {
            return Ok(());
        }

        tracing::warn!(
            enclave = %self.config.enclave,
            class = %message.class_name(),
            operation = %operation,
            "policy denied operation"
        );
        Err(Error::PermissionDenied {
            operation,
            class_name: message.class_name().to_string(),
        })
    }

    async fn send_one_way(&self, message: &Message) -> Result<()> {
        self.transport.send(message, true).await?;
        Ok(())
    }

    async fn round_trip(&self, message: &Message) -> Result<Value> {
        match self.transport.send(message, false).await? {
            Some(reply) => reply.into_result().map_err(Error::Remote),
            None => Err(Error::Transport(transport::Error::ConnectionLost(
                "round trip returned no reply".into(),
            ))),
        }
    }

    fn handle_of(&self, obj: Option<&ObjectKey>, class_name: &str) -> Result<Handle> {
        match obj {
            Some(obj) => Ok(self.registry.lookup(class_name, obj)?),
            None => Ok(Handle::STATIC),
        }
    }

    // ========================================================================
    //  Strict forms
    // ========================================================================

    /// Registers `obj` and asks the remote side to build its counterpart.
    ///
    /// An object that is already registered keeps its handle and nothing is sent.
    pub async fn try_construct(
        &self,
        obj: &ObjectKey,
        class_name: &str,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Result<Handle> {
        let handle = match self.registry.register(class_name, obj)? {
            Registration::Existing(handle) => return Ok(handle),
            Registration::Fresh(handle) => handle,
        };

        let message = Message::construct(handle, class_name, arg_types, args);
        let sent = match self.check(&message) {
            Ok(()) => self.send_one_way(&message).await,
            Err(e) => Err(e),
        };

        if let Err(e) = sent {
            let _ = self.registry.unregister(class_name, obj);
            return Err(e);
        }

        tracing::info!(enclave = %self.config.enclave, class = %class_name, handle = %handle, "constructed remote object");
        Ok(handle)
    }

    /// Releases the remote counterpart of `obj`. The local entry is removed
    /// even if the remote side cannot be told.
    pub async fn try_finalize(&self, obj: &ObjectKey, class_name: &str) -> Result<()> {
        let handle = self.registry.lookup(class_name, obj)?;
        let message = Message::finalize(handle, class_name);
        self.check(&message)?;

        let sent = self.send_one_way(&message).await;
        let _ = self.registry.unregister(class_name, obj);
        sent?;

        tracing::info!(enclave = %self.config.enclave, class = %class_name, handle = %handle, "finalized remote object");
        Ok(())
    }

    /// Invokes a method on `obj`'s counterpart, or a static method when `obj` is `None`.
    pub async fn try_invoke(
        &self,
        obj: Option<&ObjectKey>,
        class_name: &str,
        method_name: &str,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Result<Value> {
        let handle = self.handle_of(obj, class_name)?;
        let message = Message::invoke(handle, class_name, method_name, arg_types, args);
        self.check(&message)?;

        tracing::debug!(enclave = %self.config.enclave, class = %class_name, handle = %handle, method = %method_name, "invoke");
        self.round_trip(&message).await
    }

    pub async fn try_invoke_static(
        &self,
        class_name: &str,
        method_name: &str,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.try_invoke(None, class_name, method_name, arg_types, args).await
    }

    pub async fn try_read_field(&self, obj: &ObjectKey, class_name: &str, field_name: &str) -> Result<Value> {
        let handle = self.registry.lookup(class_name, obj)?;
        let message = Message::read_field(handle, class_name, field_name);
        self.check(&message)?;
        self.round_trip(&message).await
    }

    pub async fn try_write_field(
        &self,
        obj: &ObjectKey,
        class_name: &str,
        field_name: &str,
        value: Value,
    ) -> Result<()> {
        let handle = self.registry.lookup(class_name, obj)?;
        let message = Message::write_field(handle, class_name, field_name, value);
        self.check(&message)?;
        self.send_one_way(&message).await
    }

    pub async fn try_read_static_field(&self, class_name: &str, field_name: &str) -> Result<Value> {
        let message = Message::read_static_field(class_name, field_name);
        self.check(&message)?;
        self.round_trip(&message).await
    }

    pub async fn try_write_static_field(&self, class_name: &str, field_name: &str, value: Value) -> Result<()> {
        let message = Message::write_static_field(class_name, field_name, value);
        self.check(&message)?;
        self.send_one_way(&message).await
    }

    // ========================================================================
    //  Non-throwing forms
    // ========================================================================

    pub async fn construct(
        &self,
        obj: &ObjectKey,
        class_name: &str,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Option<Handle> {
        let res = self.try_construct(obj, class_name, arg_types, args).await;
        self.settle("construct", class_name, res)
    }

    pub async fn finalize(&self, obj: &ObjectKey, class_name: &str) {
        let res = self.try_finalize(obj, class_name).await;
        self.settle("finalize", class_name, res);
    }

    pub async fn invoke(
        &self,
        obj: Option<&ObjectKey>,
        class_name: &str,
        method_name: &str,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Option<Value> {
        let res = self.try_invoke(obj, class_name, method_name, arg_types, args).await;
        self.settle("invoke", class_name, res)
    }

    pub async fn invoke_static(
        &self,
        class_name: &str,
        method_name: &str,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Option<Value> {
        self.invoke(None, class_name, method_name, arg_types, args).await
    }

    pub async fn read_field(&self, obj: &ObjectKey, class_name: &str, field_name: &str) -> Option<Value> {
        let res = self.try_read_field(obj, class_name, field_name).await;
        self.settle("read-field", class_name, res)
    }

    pub async fn write_field(&self, obj: &ObjectKey, class_name: &str, field_name: &str, value: Value) {
        let res = self.try_write_field(obj, class_name, field_name, value).await;
        self.settle("write-field", class_name, res);
    }

    pub async fn read_static_field(&self, class_name: &str, field_name: &str) -> Option<Value> {
        let res = self.try_read_static_field(class_name, field_name).await;
        self.settle("read-field", class_name, res)
    }

    pub async fn write_static_field(&self, class_name: &str, field_name: &str, value: Value) {
        let res = self.try_write_static_field(class_name, field_name, value).await;
        self.settle("write-field", class_name, res);
    }

    fn settle<T>(&self, operation: &str, class_name: &str, res: Result<T>) -> Option<T> {
        match res {
            Ok(value) => Some(value),
            Err(e) if e.is_soft() => {
                tracing::warn!(enclave = %self.config.enclave, class = %class_name, error = %e, "{} failed", operation);
                None
            }
            Err(e) => {
                tracing::error!(enclave = %self.config.enclave, class = %class_name, error = %e, "{} failed", operation);
                None
            }
        }
    }
}
