//! Plugins observe a socket's events and may act on the socket.

mod log;

pub use log::LogPlugin;

use crate::codec::Payload;
use crate::events::{EventKind, SocketEvent};
use crate::socket::WeakSocket;
use serde_json::Value;
use std::time::Duration;

/// A socket plugin.
///
/// Every handler has a no-op default, so a plugin implements only the events
/// it cares about. [`Plugin::handles`] decides which kinds the plugin is
/// registered for; plugins are registered in the order they were added to
/// the options, before any handler set directly on the options.
///
/// Shortly after the socket is built (on the next turn of the `LocalSet`),
/// each plugin receives a [`WeakSocket`] through [`Plugin::attach`].
pub trait Plugin {
    /// Whether the plugin wants events of this kind. Defaults to all kinds.
    fn handles(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }

    /// Receives the owning socket once construction has finished.
    fn attach(&self, socket: WeakSocket) {
        let _ = socket;
    }

    /// Called when the socket is destroyed.
    fn destroy(&self) {}

    /// The transport handle opened.
    fn on_open(&self) {}

    /// The transport handle received a raw payload.
    fn on_message(&self, payload: &Payload) {
        let _ = payload;
    }

    /// The transport handle closed.
    fn on_close(&self) {}

    /// The transport handle reported an error.
    fn on_error(&self, reason: &str) {
        let _ = reason;
    }

    /// The socket connected.
    fn on_connect(&self) {}

    /// The socket lost its transport handle.
    fn on_disconnect(&self, was_open: bool) {
        let _ = was_open;
    }

    /// Unsolicited data arrived.
    fn on_data(&self, data: &Value) {
        let _ = data;
    }

    /// A reconnection attempt was scheduled.
    fn on_scheduled(&self, delay: Duration) {
        let _ = delay;
    }
}

// Routes an event to the matching plugin handler.
pub(crate) fn deliver(plugin: &dyn Plugin, event: &SocketEvent) {
    match event {
        SocketEvent::Open => plugin.on_open(),
        SocketEvent::Message(payload) => plugin.on_message(payload),
        SocketEvent::Close => plugin.on_close(),
        SocketEvent::Error(reason) => plugin.on_error(reason),
        SocketEvent::Connect => plugin.on_connect(),
        SocketEvent::Disconnect { was_open } => plugin.on_disconnect(*was_open),
        SocketEvent::Data(data) => plugin.on_data(data),
        SocketEvent::Scheduled(delay) => plugin.on_scheduled(*delay),
    }
}
