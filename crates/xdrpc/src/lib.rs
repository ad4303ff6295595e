//! # xdrpc
//!
//! The message model for invoking operations on objects that live across a
//! trust boundary.
//!
//! ## Architecture
//!
//! A caller describes one operation (construct, invoke, field read or write,
//! finalize) as a `Message` that names the target by class name and `Handle`.
//! Every message has a deterministic `CorrelationTag`; its reply travels under
//! the matching response tag. Payloads are `Value`s, signatures are `TypeTag`s,
//! and `codec` moves all of it to and from bytes.

pub mod codec;
pub mod error;
pub mod message;
pub mod tag;
pub mod value;


pub use error::Error;
pub use error::FailureReason;
pub use error::Result;
pub use message::AccessMode;
pub use message::Construct;
pub use message::FieldAccess;
pub use message::Finalize;
pub use message::Handle;
pub use message::Invoke;
pub use message::Kind;
pub use message::Message;
pub use message::Reply;
pub use message::Scope;
pub use tag::CorrelationTag;
pub use value::TypeTag;
pub use value::Value;
