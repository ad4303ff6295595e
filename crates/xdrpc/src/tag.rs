//! # Correlation Tags
//!
//! A tag is the routing key a request travels under, and the key its reply
//! comes back under. Tags are derived from the identity of a message (its
//! kind, class, member and handle) and never from its payload, so a caller
//! can compute the reply tag before anything is sent.
//!
//! ## Layout
//!
//! - `mux`: the handle, reinterpreted as `u32` (`-1` becomes `u32::MAX`).
//! - `sec`: the first four bytes of a BLAKE3 hash over the class name and
//!   member name, read little-endian.
//! - `typ`: the operation kind; replies set `RESPONSE_BIT`.

use serde::Deserialize;
use serde::Serialize;

/// Set in `typ` for every reply tag, and never set in a request tag.
pub const RESPONSE_BIT: u32 = 0x100;

/// An opaque routing key for one request or its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationTag {
    pub mux: u32,
    pub sec: u32,
    pub typ: u32,
}

impl CorrelationTag {
    /// Builds a request tag from message identity.
    pub fn request(kind: u32, class_name: &str, member: &str, handle: i32) -> Self {
        let mut input = Vec::with_capacity(class_name.len() + member.len() + 1);
        input.extend_from_slice(class_name.as_bytes());
        // separator keeps ("ab", "c") apart from ("a", "bc")
        input.push(0);
        input.extend_from_slice(member.as_bytes());
        let hash = blake3::hash(&input);
        let mut sec = [0u8; 4];
        sec.copy_from_slice(&hash.as_bytes()[..4]);

        Self {
            mux: handle as u32,
            sec: u32::from_le_bytes(sec),
            typ: kind & !RESPONSE_BIT,
        }
    }

    /// The tag the reply to this request is sent under.
    pub fn response(self) -> Self {
        Self { typ: self.typ | RESPONSE_BIT, ..self }
    }

    pub fn is_response(&self) -> bool {
        self.typ & RESPONSE_BIT != 0
    }

    pub fn is_request(&self) -> bool {
        !self.is_response()
    }
}

impl std::fmt::Display for CorrelationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}, {:#010x}, {:#x}>", self.mux, self.sec, self.typ)
    }
}
