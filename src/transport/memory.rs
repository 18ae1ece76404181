//! In-process transport driven by the caller.
//!
//! Nothing happens on a [`MemoryConnection`] by itself: the owner decides
//! when it opens, what it receives and how it dies. That makes it the
//! transport of choice for tests and demos.
//!
//! ```
//! use rustsock::transport::memory::MemoryTransport;
//!
//! let transport = MemoryTransport::new();
//! assert!(transport.last_connection().is_none());
//! ```

use super::{Transport, TransportHandle, TransportSink};
use crate::codec::Payload;
use crate::error::Error;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

#[derive(Default)]
struct TransportState {
    connections: Vec<MemoryConnection>,
    refuse: Option<String>,
}

/// A transport whose connections are scripted by the caller.
///
/// Clones share the same connection list, so a test can keep one clone and
/// hand another to the socket.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Rc<RefCell<TransportState>>,
}

impl MemoryTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection opened so far, oldest first.
    pub fn connections(&self) -> Vec<MemoryConnection> {
        self.state.borrow().connections.clone()
    }

    /// The most recently opened connection.
    pub fn last_connection(&self) -> Option<MemoryConnection> {
        self.state.borrow().connections.last().cloned()
    }

    /// Number of connections opened so far.
    pub fn open_count(&self) -> usize {
        self.state.borrow().connections.len()
    }

    /// Makes every further `open` fail with `reason`, or succeed again when
    /// `reason` is `None`.
    pub fn refuse(&self, reason: Option<&str>) {
        self.state.borrow_mut().refuse = reason.map(str::to_string);
    }
}

impl Transport for MemoryTransport {
    fn open(&self, endpoint: &str, sink: TransportSink) -> Result<Box<dyn TransportHandle>, Error> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.refuse {
            debug!(endpoint, reason = reason.as_str(), "Refusing memory connection");
            return Err(Error::Transport(reason.clone()));
        }
        let connection = MemoryConnection {
            state: Rc::new(RefCell::new(ConnectionState {
                endpoint: endpoint.to_string(),
                sink,
                sent: Vec::new(),
                open: false,
                closed: false,
                reject: None,
            })),
        };
        debug!(endpoint, index = state.connections.len(), "Opened memory connection");
        state.connections.push(connection.clone());
        Ok(Box::new(connection))
    }
}

struct ConnectionState {
    endpoint: String,
    sink: TransportSink,
    sent: Vec<Payload>,
    open: bool,
    closed: bool,
    reject: Option<String>,
}

/// One scripted connection.
///
/// The socket sees it as a [`TransportHandle`]; the test drives it with
/// [`accept`](Self::accept), [`deliver`](Self::deliver),
/// [`fail`](Self::fail) and [`hang_up`](Self::hang_up).
#[derive(Clone)]
pub struct MemoryConnection {
    state: Rc<RefCell<ConnectionState>>,
}

impl MemoryConnection {
    /// The endpoint this connection was opened against.
    pub fn endpoint(&self) -> String {
        self.state.borrow().endpoint.clone()
    }

    /// Payloads the socket sent, oldest first.
    pub fn sent(&self) -> Vec<Payload> {
        self.state.borrow().sent.clone()
    }

    /// Sent payloads that are text, oldest first.
    pub fn sent_text(&self) -> Vec<String> {
        self.state
            .borrow()
            .sent
            .iter()
            .filter_map(|p| p.as_text().map(str::to_string))
            .collect()
    }

    /// Whether the connection has been closed by either side.
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Whether the connection opened and has not closed.
    pub fn is_open(&self) -> bool {
        let state = self.state.borrow();
        state.open && !state.closed
    }

    /// Whether the socket still listens to this connection.
    pub fn is_attached(&self) -> bool {
        self.state.borrow().sink.is_attached()
    }

    fn sink(&self) -> TransportSink {
        self.state.borrow().sink.clone()
    }

    /// Completes the opening handshake.
    pub fn accept(&self) -> Result<(), Error> {
        self.state.borrow_mut().open = true;
        self.sink().opened()
    }

    /// Makes every following send fail with `reason` while the connection
    /// stays open; `None` accepts sends again.
    pub fn reject_sends(&self, reason: Option<&str>) {
        self.state.borrow_mut().reject = reason.map(str::to_string);
    }

    /// Delivers a payload to the socket.
    pub fn deliver(&self, payload: impl Into<Payload>) -> Result<(), Error> {
        self.sink().message(payload.into())
    }

    /// Reports the connection closed by the remote side.
    pub fn hang_up(&self) -> Result<(), Error> {
        self.state.borrow_mut().closed = true;
        self.sink().closed()
    }

    /// Reports an error followed by a close, the way browsers report a
    /// failed WebSocket.
    pub fn fail(&self, reason: &str) -> Result<(), Error> {
        self.state.borrow_mut().closed = true;
        let sink = self.sink();
        sink.errored(reason)?;
        sink.closed()
    }

    /// Reports a bare error without a following close.
    pub fn error(&self, reason: &str) -> Result<(), Error> {
        self.state.borrow_mut().closed = true;
        self.sink().errored(reason)
    }
}

impl TransportHandle for MemoryConnection {
    fn send(&self, payload: Payload) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        if !state.open || state.closed {
            return Err(Error::Transport(format!(
                "memory connection to {} is not open",
                state.endpoint
            )));
        }
        if let Some(reason) = &state.reject {
            return Err(Error::Transport(reason.clone()));
        }
        state.sent.push(payload);
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        // The sink result has nowhere to go from a local close.
        let _ = self.sink().closed();
    }
}
