//! # Error Definitions
//!
//! Failures of the message layer itself, and the reasons a remote peer gives
//! for refusing or failing an operation.

use serde::Deserialize;
use serde::Serialize;

/// Operational failures within the message layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The serializer rejected the bytes or the value.
    Serialization(postcard::Error),
    /// A value did not have the type the reader expected.
    TypeMismatch { expected: String, found: String },
    /// The message decoded, but its shape breaks a protocol invariant
    /// (e.g. a static field access that names an instance handle).
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self { Self::Serialization(e) }
}

/// A specialized Result type for message operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons for a remote failure (the "Err" side of a Reply).
///
/// These are distinct from `Error`; these represent the *remote* side failing
/// to carry out the operation, whereas `Error` represents the message layer failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// No live instance is registered under the (class, handle) pair.
    HandleNotFound,
    /// The class name is unknown to the remote catalog.
    ClassNotFound,
    /// No constructor, method or field matches the name and signature.
    MemberNotFound,
    /// Arguments or values did not match the member's declared types.
    TypeMismatch,
    /// The member body ran and failed.
    InvocationFailed(String),
    /// The peer does not support the requested operation.
    Unsupported,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandleNotFound => write!(f, "handle not found"),
            Self::ClassNotFound => write!(f, "class not found"),
            Self::MemberNotFound => write!(f, "member not found"),
            Self::TypeMismatch => write!(f, "type mismatch"),
            Self::InvocationFailed(msg) => write!(f, "invocation failed: {}", msg),
            Self::Unsupported => write!(f, "unsupported operation"),
        }
    }
}
