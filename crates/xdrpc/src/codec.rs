//! # Wire Codec
//!
//! Turns messages and replies into bytes and back. The wire payload of every
//! request is a serialized `Message`; the payload of every reply is a
//! serialized `Reply`.
//!
//! Decoding a message also validates its shape, so a peer never acts on a
//! request that breaks a protocol invariant.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::message::Message;
use crate::message::Reply;

/// Serializes any wire-safe value.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(postcard::to_stdvec(value)?)
}

/// Deserializes any wire-safe value.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(postcard::from_bytes(bytes)?)
}

pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    serialize(message)
}

/// Decodes a request and checks its shape.
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let message: Message = deserialize(bytes)?;
    message.validate()?;
    Ok(message)
}

pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>> {
    serialize(reply)
}

pub fn decode_reply(bytes: &[u8]) -> Result<Reply> {
    deserialize(bytes)
}
