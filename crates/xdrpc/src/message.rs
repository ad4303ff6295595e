//! # Protocol Messages
//!
//! Defines the requests a caller can make on a remote object, and the reply
//! envelope that comes back for the ones that are not one-way.
//!
//! ## Invariants
//! - A field access names handle `-1` if and only if its scope is `Static`.
//! - An invoke has no static flag: handle `-1` is its only static marker.
//! - Construct and Finalize always name a real (positive) handle.
//! - Signatures and argument lists have the same length.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::FailureReason;
use crate::error::Result;
use crate::tag::CorrelationTag;
use crate::value::TypeTag;
use crate::value::Value;

/// Names a server-side instance within one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(pub i32);

impl Handle {
    /// The static context: no instance.
    pub const STATIC: Handle = Handle(-1);

    pub fn is_static(&self) -> bool {
        *self == Self::STATIC
    }

    /// Whether this names an instance the registry could have issued.
    pub fn is_instance(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_static() {
            write!(f, "static")
        } else {
            write!(f, "oid-{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Instance,
    Static,
}

/// Operation kind; also the `typ` of a request tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Construct = 1,
    Invoke = 2,
    ReadField = 3,
    WriteField = 4,
    Finalize = 5,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Kind::Construct => "construct",
            Kind::Invoke => "invoke",
            Kind::ReadField => "read-field",
            Kind::WriteField => "write-field",
            Kind::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Construct {
    pub handle: Handle,
    pub class_name: String,
    pub arg_types: Vec<TypeTag>,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoke {
    pub handle: Handle,
    pub class_name: String,
    pub method_name: String,
    pub arg_types: Vec<TypeTag>,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAccess {
    pub handle: Handle,
    pub class_name: String,
    pub field_name: String,
    /// Present for writes (possibly `Value::Null`), absent for reads.
    pub value: Option<Value>,
    pub mode: AccessMode,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finalize {
    pub handle: Handle,
    pub class_name: String,
}

/// A request on a remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Construct(Construct),
    Invoke(Invoke),
    FieldAccess(FieldAccess),
    Finalize(Finalize),
}

impl Message {
    pub fn construct(
        handle: Handle,
        class_name: impl Into<String>,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Self {
        Message::Construct(Construct {
            handle,
            class_name: class_name.into(),
            arg_types,
            args,
        })
    }

    pub fn invoke(
        handle: Handle,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Self {
        Message::Invoke(Invoke {
            handle,
            class_name: class_name.into(),
            method_name: method_name.into(),
            arg_types,
            args,
        })
    }

    pub fn invoke_static(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        arg_types: Vec<TypeTag>,
        args: Vec<Value>,
    ) -> Self {
        Self::invoke(Handle::STATIC, class_name, method_name, arg_types, args)
    }

    pub fn read_field(handle: Handle, class_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self::field(handle, class_name, field_name, None, AccessMode::Read, Scope::Instance)
    }

    pub fn write_field(
        handle: Handle,
        class_name: impl Into<String>,
        field_name: impl Into<String>,
        value: Value,
    ) -> Self {
        Self::field(handle, class_name, field_name, Some(value), AccessMode::Write, Scope::Instance)
    }

    pub fn read_static_field(class_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self::field(Handle::STATIC, class_name, field_name, None, AccessMode::Read, Scope::Static)
    }

    pub fn write_static_field(
        class_name: impl Into<String>,
        field_name: impl Into<String>,
        value: Value,
    ) -> Self {
        Self::field(Handle::STATIC, class_name, field_name, Some(value), AccessMode::Write, Scope::Static)
    }

    pub fn finalize(handle: Handle, class_name: impl Into<String>) -> Self {
        Message::Finalize(Finalize {
            handle,
            class_name: class_name.into(),
        })
    }

    fn field(
        handle: Handle,
        class_name: impl Into<String>,
        field_name: impl Into<String>,
        value: Option<Value>,
        mode: AccessMode,
        scope: Scope,
    ) -> Self {
        Message::FieldAccess(FieldAccess {
            handle,
            class_name: class_name.into(),
            field_name: field_name.into(),
            value,
            mode,
            scope,
        })
    }

    pub fn kind(&self) -> Kind {
        match self {
            Message::Construct(_) => Kind::Construct,
            Message::Invoke(_) => Kind::Invoke,
            Message::FieldAccess(f) => match f.mode {
                AccessMode::Read => Kind::ReadField,
                AccessMode::Write => Kind::WriteField,
            },
            Message::Finalize(_) => Kind::Finalize,
        }
    }

    pub fn handle(&self) -> Handle {
        match self {
            Message::Construct(m) => m.handle,
            Message::Invoke(m) => m.handle,
            Message::FieldAccess(m) => m.handle,
            Message::Finalize(m) => m.handle,
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            Message::Construct(m) => &m.class_name,
            Message::Invoke(m) => &m.class_name,
            Message::FieldAccess(m) => &m.class_name,
            Message::Finalize(m) => &m.class_name,
        }
    }

    /// Method or field name; `None` for construct and finalize.
    pub fn member_name(&self) -> Option<&str> {
        match self {
            Message::Invoke(m) => Some(&m.method_name),
            Message::FieldAccess(m) => Some(&m.field_name),
            Message::Construct(_) | Message::Finalize(_) => None,
        }
    }

    /// Construct, field writes and finalize get no reply.
    pub fn is_one_way(&self) -> bool {
        matches!(self.kind(), Kind::Construct | Kind::WriteField | Kind::Finalize)
    }

    /// The tag this request is sent under.
    pub fn tag(&self) -> CorrelationTag {
        CorrelationTag::request(
            self.kind() as u32,
            self.class_name(),
            self.member_name().unwrap_or(""),
            self.handle().0,
        )
    }

    /// The tag the reply to this request comes back under.
    pub fn response_tag(&self) -> CorrelationTag {
        self.tag().response()
    }

    /// Checks the shape invariants listed at the top of this module.
    pub fn validate(&self) -> Result<()> {
        match self {
            Message::Construct(m) => {
                require_instance(m.handle, "construct")?;
                require_arity(&m.arg_types, &m.args)
            }
            Message::Invoke(m) => {
                if !m.handle.is_static() && !m.handle.is_instance() {
                    return Err(Error::ProtocolViolation(format!("invoke on invalid handle {}", m.handle.0)));
                }
                require_arity(&m.arg_types, &m.args)
            }
            Message::FieldAccess(m) => {
                match (m.scope, m.handle.is_static()) {
                    (Scope::Static, false) => {
                        return Err(Error::ProtocolViolation(format!(
                            "static field access names handle {}", m.handle.0
                        )));
                    }
                    (Scope::Instance, true) => {
                        return Err(Error::ProtocolViolation("instance field access names the static handle".into()));
                    }
                    (Scope::Instance, false) => require_instance(m.handle, "field access")?,
                    (Scope::Static, true) => {}
                }
                match (m.mode, &m.value) {
                    (AccessMode::Read, Some(_)) => Err(Error::ProtocolViolation("field read carries a value".into())),
                    (AccessMode::Write, None) => Err(Error::ProtocolViolation("field write carries no value".into())),
                    _ => Ok(()),
                }
            }
            Message::Finalize(m) => require_instance(m.handle, "finalize"),
        }
    }
}

fn require_instance(handle: Handle, what: &str) -> Result<()> {
    if handle.is_instance() {
        Ok(())
    } else {
        Err(Error::ProtocolViolation(format!("{} on invalid handle {}", what, handle.0)))
    }
}

fn require_arity(types: &[TypeTag], args: &[Value]) -> Result<()> {
    if types.len() != args.len() {
        return Err(Error::ProtocolViolation(format!(
            "signature has {} types but {} arguments were sent",
            types.len(),
            args.len()
        )));
    }
    Ok(())
}

/// The answer to a non-one-way request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// The operation ran; `Value::Null` for void methods and null fields.
    Ok(Value),
    /// The operation did not run, or failed while running.
    Err(FailureReason),
}

impl Reply {
    /// Collapses the reply to `{value | absent}`.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Reply::Ok(v) => Some(v),
            Reply::Err(_) => None,
        }
    }

    pub fn into_result(self) -> std::result::Result<Value, FailureReason> {
        match self {
            Reply::Ok(v) => Ok(v),
            Reply::Err(reason) => Err(reason),
        }
    }
}
