//! Envelopers package application values into the shape the remote endpoint
//! expects, and unpackage replies.
//!
//! The enveloper runs before the encoder on the way out and after it on the
//! way in, so it sees structured [`Value`]s. It is also the natural place to
//! stamp a correlation id onto outgoing requests; see [`IdEnveloper`].

#[cfg(feature = "id-enveloper")]
mod id;

#[cfg(feature = "id-enveloper")]
pub use id::IdEnveloper;

use crate::error::Error;
use serde_json::Value;

/// Wraps outbound values and unwraps inbound ones.
///
/// Returning `Ok(None)` from `wrap` aborts the outbound message; returning
/// `Ok(None)` from `unwrap` means the message carries nothing for the
/// application.
pub trait Enveloper {
    /// Wraps a value into an envelope.
    fn wrap(&self, value: Value) -> Result<Option<Value>, Error>;

    /// Unwraps an envelope into the value it carries.
    fn unwrap(&self, value: Value) -> Result<Option<Value>, Error>;
}

/// The identity enveloper.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Enveloper for PassThrough {
    fn wrap(&self, value: Value) -> Result<Option<Value>, Error> {
        Ok(Some(value))
    }

    fn unwrap(&self, value: Value) -> Result<Option<Value>, Error> {
        Ok(Some(value))
    }
}

impl<E: Enveloper + ?Sized> Enveloper for Box<E> {
    fn wrap(&self, value: Value) -> Result<Option<Value>, Error> {
        (**self).wrap(value)
    }

    fn unwrap(&self, value: Value) -> Result<Option<Value>, Error> {
        (**self).unwrap(value)
    }
}
