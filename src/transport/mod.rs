//! The transport contract the socket is built on.
//!
//! A [`Transport`] opens [`TransportHandle`]s. Each handle is one attempt at
//! one connection: it opens (or fails to), exchanges payloads, and dies. The
//! platform reports what happens to a handle through the [`TransportSink`]
//! it was opened with; the sink is the handle's four raw callback slots.
//!
//! Implementations must respect a few ordering rules:
//!
//! - no sink method is called from inside [`Transport::open`]; signals are
//!   delivered afterwards, as a browser WebSocket does;
//! - `opened` comes before any `message`;
//! - after `closed` or `errored`, the handle stays silent (an `errored`
//!   followed by a `closed` for the same failure is tolerated).
//!
//! Sink methods may be called from inside [`TransportHandle::close`] and
//! [`TransportHandle::send`]; the socket never holds internal state borrowed
//! while calling into a handle.

pub mod memory;

use crate::codec::Payload;
use crate::error::Error;
use crate::socket::{self, Shared};
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Opens connections.
pub trait Transport {
    /// Starts opening a connection to `endpoint`, reporting its lifecycle to
    /// `sink`.
    ///
    /// An error here means the attempt failed outright; the socket treats it
    /// like a handle that died before opening.
    fn open(&self, endpoint: &str, sink: TransportSink) -> Result<Box<dyn TransportHandle>, Error>;
}

/// One connection attempt.
pub trait TransportHandle {
    /// Sends a payload over the open connection.
    fn send(&self, payload: Payload) -> Result<(), Error>;

    /// Closes the connection. The platform reports the close through the
    /// sink.
    fn close(&self);
}

impl<T: Transport + ?Sized> Transport for Rc<T> {
    fn open(&self, endpoint: &str, sink: TransportSink) -> Result<Box<dyn TransportHandle>, Error> {
        (**self).open(endpoint, sink)
    }
}

/// The raw callback slots of one transport handle.
///
/// A sink belongs to exactly one handle. Once the socket gives up on that
/// handle the sink is detached and every further signal is ignored, which is
/// what keeps a late `closed` after an `errored` from being processed twice.
///
/// The return values carry errors raised while the socket processed the
/// signal, for instance a payload the encoder chain could not decode.
#[derive(Clone)]
pub struct TransportSink {
    socket: Weak<Shared>,
    attached: Rc<Cell<bool>>,
    handle_id: u64,
}

impl TransportSink {
    pub(crate) fn new(socket: Weak<Shared>, attached: Rc<Cell<bool>>, handle_id: u64) -> Self {
        Self {
            socket,
            attached,
            handle_id,
        }
    }

    /// Whether the socket still listens to this handle.
    pub fn is_attached(&self) -> bool {
        self.attached.get() && self.socket.strong_count() > 0
    }

    fn target(&self) -> Option<Rc<Shared>> {
        if !self.attached.get() {
            return None;
        }
        self.socket.upgrade()
    }

    /// Reports that the connection opened.
    pub fn opened(&self) -> Result<(), Error> {
        match self.target() {
            Some(shared) => socket::handle_open(&shared, self.handle_id),
            None => Ok(()),
        }
    }

    /// Reports a received payload.
    pub fn message(&self, payload: Payload) -> Result<(), Error> {
        match self.target() {
            Some(shared) => socket::handle_message(&shared, self.handle_id, payload),
            None => Ok(()),
        }
    }

    /// Reports that the connection closed.
    pub fn closed(&self) -> Result<(), Error> {
        match self.target() {
            Some(shared) => socket::handle_close(&shared, self.handle_id),
            None => Ok(()),
        }
    }

    /// Reports a connection error. The handle is considered dead.
    pub fn errored(&self, reason: impl Into<String>) -> Result<(), Error> {
        match self.target() {
            Some(shared) => socket::handle_error(&shared, self.handle_id, reason.into()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink")
            .field("handle_id", &self.handle_id)
            .field("attached", &self.attached.get())
            .finish()
    }
}
