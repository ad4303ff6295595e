//! # Transport Abstraction
//!
//! The contract every way of reaching the remote side fulfills: hand over a
//! message, and unless it is one-way, wait for its reply.
//!
//! ## Philosophy
//!
//! - **Message-Oriented**: The Transport receives a whole `Message`. Whether it
//!   serializes it (correlated transport) or hands it over in-process (direct
//!   transport) is its own business.
//! - **Blocking per call**: `send` resolves only once the reply is in hand, or
//!   once the one-way send completed. There is no pipelining.

use xdrpc::Message;
use xdrpc::Reply;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The remote endpoint cannot be resolved or reached.
    Unavailable(String),
    /// The channel was dropped while a request was in flight.
    ConnectionLost(String),
    /// The configured receive timeout elapsed before the reply arrived.
    Timeout,
    /// A payload could not be encoded or decoded.
    Rpc(xdrpc::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(name) => write!(f, "Remote unavailable: {}", name),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Rpc(e) => write!(f, "RPC error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(e) => Some(e),
            _ => None,
        }
    }
}

impl From<xdrpc::Error> for Error {
    fn from(e: xdrpc::Error) -> Self {
        Self::Rpc(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to deliver a message to the remote side.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Delivers `message`.
    ///
    /// # invariants
    /// - If `one_way`, returns `Ok(None)` as soon as the send completed.
    /// - Otherwise returns `Ok(Some(reply))` with the reply correlated to this request.
    /// - Must return `Err` if the remote cannot be reached.
    async fn send(&self, message: &Message, one_way: bool) -> Result<Option<Reply>>;
}
