//! Socket events and the registry that fans them out to observers.

use crate::codec::Payload;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

/// The kinds of event a [`Socket`](crate::Socket) emits.
///
/// `Open`, `Message`, `Close` and `Error` mirror the raw signals of the
/// current transport handle. The rest are the socket's own, higher-level
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The transport handle opened.
    Open,
    /// The transport handle received a raw payload.
    Message,
    /// The transport handle closed.
    Close,
    /// The transport handle reported an error.
    Error,
    /// The socket is connected and ready; fires after `Open`.
    Connect,
    /// The socket lost its transport handle; fires once per handle.
    Disconnect,
    /// A decoded, unwrapped message arrived that no request was waiting for.
    Data,
    /// A reconnection attempt has been scheduled.
    Scheduled,
}

impl EventKind {
    /// Every event kind, raw signals first.
    pub const ALL: [EventKind; 8] = [
        EventKind::Open,
        EventKind::Message,
        EventKind::Close,
        EventKind::Error,
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::Data,
        EventKind::Scheduled,
    ];

    /// The event name.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Message => "message",
            EventKind::Close => "close",
            EventKind::Error => "error",
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::Data => "data",
            EventKind::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event delivered to handlers and plugins.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// The transport handle opened.
    Open,
    /// The transport handle received this payload, before decoding.
    Message(Payload),
    /// The transport handle closed.
    Close,
    /// The transport handle reported an error.
    Error(String),
    /// The socket is connected; buffered messages are sent right after.
    Connect,
    /// The transport handle is gone. `was_open` is false when the handle
    /// never finished opening.
    Disconnect {
        /// Whether the lost handle had opened.
        was_open: bool,
    },
    /// An unsolicited message, decoded and unwrapped.
    Data(Value),
    /// A reconnection attempt will start after this delay.
    Scheduled(Duration),
}

impl SocketEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SocketEvent::Open => EventKind::Open,
            SocketEvent::Message(_) => EventKind::Message,
            SocketEvent::Close => EventKind::Close,
            SocketEvent::Error(_) => EventKind::Error,
            SocketEvent::Connect => EventKind::Connect,
            SocketEvent::Disconnect { .. } => EventKind::Disconnect,
            SocketEvent::Data(_) => EventKind::Data,
            SocketEvent::Scheduled(_) => EventKind::Scheduled,
        }
    }
}

/// An event observer.
///
/// Handlers run synchronously on the thread that owns the socket and may
/// call back into it.
pub type Handler = Rc<dyn Fn(&SocketEvent)>;

/// Per-kind ordered lists of handlers.
#[derive(Default)]
pub(crate) struct EventRegistry {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, kind: EventKind, handler: Handler) {
        trace!(event = %kind, "Registering event handler");
        self.handlers.entry(kind).or_default().push(handler);
    }

    // Snapshot of the handlers for `kind`, so dispatch can run without
    // holding a borrow of the registry.
    pub(crate) fn handlers(&self, kind: EventKind) -> Vec<Handler> {
        self.handlers.get(&kind).cloned().unwrap_or_default()
    }

    pub(crate) fn len(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub(crate) fn clear(&mut self) {
        self.handlers.clear();
    }
}
