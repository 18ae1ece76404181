//! Encoders turn enveloped application values into transport payloads and
//! back.
//!
//! Encoders chain like decorators: an encoder owns an inner [`Encoder`] and
//! calls it as the last step of `encode` and the first step of `decode`.
//! [`PassThrough`] is the identity encoder and the usual innermost link.

mod json;

pub use json::JsonEncoder;

use crate::error::Error;
use serde_json::Value;

/// A unit of data moving through an encoder chain or over a transport.
///
/// Outbound messages start as [`Payload::Value`] and are usually turned
/// into [`Payload::Text`] or [`Payload::Binary`] by the encoder chain.
/// Inbound payloads travel the opposite way.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A structured value that has not been serialized (yet).
    Value(Value),
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// Converts the payload into a structured value.
    ///
    /// Text becomes a JSON string value and binary data an array of numbers.
    /// Decoders are expected to have parsed the payload already; this exists
    /// so the socket can inspect whatever the final decoder produced.
    pub fn into_value(self) -> Value {
        match self {
            Payload::Value(value) => value,
            Payload::Text(text) => Value::String(text),
            Payload::Binary(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
        }
    }

    /// Returns the text if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Length in bytes of serialized payloads; `None` for structured values.
    pub fn byte_len(&self) -> Option<usize> {
        match self {
            Payload::Value(_) => None,
            Payload::Text(text) => Some(text.len()),
            Payload::Binary(bytes) => Some(bytes.len()),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

/// Marshals outbound payloads and unmarshals inbound ones.
///
/// Returning `Ok(None)` from `encode` aborts the outbound message. Returning
/// `Ok(None)` from `decode` drops the inbound message without notifying
/// anyone. Encoders must not touch the transport.
pub trait Encoder {
    /// Encodes a payload for sending.
    fn encode(&self, payload: Payload) -> Result<Option<Payload>, Error>;

    /// Decodes a received payload.
    fn decode(&self, payload: Payload) -> Result<Option<Payload>, Error>;
}

/// The identity encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Encoder for PassThrough {
    fn encode(&self, payload: Payload) -> Result<Option<Payload>, Error> {
        Ok(Some(payload))
    }

    fn decode(&self, payload: Payload) -> Result<Option<Payload>, Error> {
        Ok(Some(payload))
    }
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn encode(&self, payload: Payload) -> Result<Option<Payload>, Error> {
        (**self).encode(payload)
    }

    fn decode(&self, payload: Payload) -> Result<Option<Payload>, Error> {
        (**self).decode(payload)
    }
}
