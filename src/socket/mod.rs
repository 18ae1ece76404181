//! The reconnecting socket.
//!
//! A [`Socket`] owns at most one transport handle and at most one pending
//! reconnect timer, never both. Outbound values run through the enveloper and
//! encoder chains before they reach the handle (or the pending queue while
//! disconnected); inbound payloads run the chains backwards and either
//! complete a waiting request or surface as `data` events.
//!
//! The socket is single-threaded: it is `!Send`, and timers run on the
//! current [`tokio::task::LocalSet`]. Handlers, plugins, providers and the
//! transport are all called without any of the socket's internal state
//! borrowed, so each of them may call back into the socket.

mod options;
mod pending;

pub use options::{Settings, SocketOptions, DEFAULT_CORRELATION_FIELD};

use crate::codec::{Encoder, Payload};
use crate::envelope::Enveloper;
use crate::error::Error;
use crate::events::{EventKind, EventRegistry, Handler, SocketEvent};
use crate::plugin::{self, Plugin};
use crate::req_resp::{correlation_key, CorrelationRegistry, ReplyFuture};
use crate::retry::{clamp_delay, ReconnectTimer, RetryProvider, UriProvider};
use crate::transport::{Transport, TransportHandle, TransportSink};
use pending::PendingQueue;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, info, instrument, trace, warn};

/// Where the socket is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport handle and no reconnect pending.
    Idle,
    /// A transport handle exists but has not opened yet.
    Connecting,
    /// The transport handle is open.
    Connected,
    /// A reconnect timer is pending.
    Scheduled,
}

// ============================================================================
// Shared State
// ============================================================================

struct Providers {
    retry: Box<dyn RetryProvider>,
    uri: Box<dyn UriProvider>,
}

// The current transport handle.
struct Link {
    id: u64,
    handle: Rc<dyn TransportHandle>,
    attached: Rc<Cell<bool>>,
    open: bool,
}

impl Link {
    fn detach(&self) {
        self.attached.set(false);
    }
}

struct State {
    link: Option<Link>,
    next_handle_id: u64,
    attempts: u32,
    timer: ReconnectTimer,
    stopped: bool,
    destroyed: bool,
    pending: PendingQueue,
    replies: CorrelationRegistry,
}

impl State {
    fn current(&self, id: u64) -> Option<&Link> {
        self.link.as_ref().filter(|link| link.id == id && link.attached.get())
    }

    fn open_handle(&self) -> Option<Rc<dyn TransportHandle>> {
        self.link
            .as_ref()
            .filter(|link| link.open)
            .map(|link| link.handle.clone())
    }
}

pub(crate) struct Shared {
    settings: Settings,
    transport: Rc<dyn Transport>,
    encoder: Box<dyn Encoder>,
    enveloper: Box<dyn Enveloper>,
    plugins: Vec<Rc<dyn Plugin>>,
    providers: RefCell<Providers>,
    events: RefCell<EventRegistry>,
    state: RefCell<State>,
}

// Where an outbound payload goes.
enum Route {
    Transmit(Rc<dyn TransportHandle>, Payload),
    Buffered,
    Dropped,
}

// ============================================================================
// Socket
// ============================================================================

/// A duplex message socket that reconnects by itself.
///
/// Cloning a `Socket` yields another reference to the same socket.
///
/// # Example
///
/// ```
/// use rustsock::transport::memory::MemoryTransport;
/// use rustsock::{Socket, SocketOptions};
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// # tokio::task::LocalSet::new().run_until(async {
/// let transport = MemoryTransport::new();
/// let socket = Socket::new(
///     SocketOptions::new()
///         .transport(transport.clone())
///         .endpoint("ws://localhost:9000"),
/// )?;
///
/// socket.connect()?;
/// socket.send(json!({"op": "subscribe"}))?; // buffered until open
///
/// let connection = transport.last_connection().unwrap();
/// connection.accept()?;
/// assert_eq!(connection.sent_text(), vec![r#"{"op":"subscribe"}"#]);
/// # Ok::<(), rustsock::Error>(())
/// # }).await.unwrap();
/// # });
/// ```
#[derive(Clone)]
pub struct Socket {
    shared: Rc<Shared>,
}

/// A non-owning reference to a [`Socket`].
#[derive(Clone)]
pub struct WeakSocket {
    shared: Weak<Shared>,
}

impl WeakSocket {
    /// Returns the socket if it is still alive.
    pub fn upgrade(&self) -> Option<Socket> {
        self.shared.upgrade().map(|shared| Socket { shared })
    }
}

impl fmt::Debug for WeakSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSocket")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl Socket {
    /// Builds a socket from `options`. The socket starts idle; call
    /// [`connect`](Self::connect) to open it.
    ///
    /// Plugins are registered first, in order, for the kinds they handle;
    /// handlers set on the options follow. Plugins receive the socket
    /// through [`Plugin::attach`] once the current task yields.
    ///
    /// # Panics
    ///
    /// Panics if plugins are configured and the call is made outside a
    /// [`tokio::task::LocalSet`].
    pub fn new(options: SocketOptions) -> Result<Self, Error> {
        options.validate()?;
        let SocketOptions {
            settings,
            transport,
            uri_provider,
            retry_provider,
            encoder,
            enveloper,
            plugins,
            handlers,
        } = options;
        let (Some(transport), Some(uri)) = (transport, uri_provider) else {
            return Err(Error::MissingOption("transport"));
        };

        let mut events = EventRegistry::new();
        for plugin in &plugins {
            for kind in EventKind::ALL.into_iter().filter(|kind| plugin.handles(*kind)) {
                let observer = plugin.clone();
                let handler: Handler =
                    Rc::new(move |event: &SocketEvent| plugin::deliver(&*observer, event));
                events.register(kind, handler);
            }
        }
        for (kind, handler) in handlers {
            events.register(kind, handler);
        }

        let socket = Socket {
            shared: Rc::new(Shared {
                settings,
                transport,
                encoder,
                enveloper,
                plugins,
                providers: RefCell::new(Providers {
                    retry: retry_provider,
                    uri,
                }),
                events: RefCell::new(events),
                state: RefCell::new(State {
                    link: None,
                    next_handle_id: 0,
                    attempts: 0,
                    timer: ReconnectTimer::default(),
                    stopped: true,
                    destroyed: false,
                    pending: PendingQueue::default(),
                    replies: CorrelationRegistry::new(),
                }),
            }),
        };

        if !socket.shared.plugins.is_empty() {
            let weak = socket.downgrade();
            tokio::task::spawn_local(async move {
                let Some(socket) = weak.upgrade() else {
                    return;
                };
                for plugin in &socket.shared.plugins {
                    plugin.attach(socket.downgrade());
                }
                trace!(count = socket.shared.plugins.len(), "Attached plugins");
            });
        }

        debug!(settings = ?socket.shared.settings, "Created socket");
        Ok(socket)
    }

    /// Returns a non-owning reference to this socket.
    pub fn downgrade(&self) -> WeakSocket {
        WeakSocket {
            shared: Rc::downgrade(&self.shared),
        }
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Opens a transport handle to the endpoint the URI provider picks.
    ///
    /// Does nothing while a handle exists or a reconnect is pending. Clears
    /// the stopped flag otherwise. A transport that fails to open counts as
    /// a handle lost before opening: `disconnect` fires and, with
    /// auto-reconnect on, a retry is scheduled.
    ///
    /// # Panics
    ///
    /// A failed open with auto-reconnect on arms a timer, which panics
    /// outside a [`tokio::task::LocalSet`].
    #[instrument(skip(self))]
    pub fn connect(&self) -> Result<(), Error> {
        let (attempt, handle_id) = {
            let mut state = self.shared.state.borrow_mut();
            if state.destroyed {
                return Err(Error::Destroyed);
            }
            if state.link.is_some() || state.timer.is_armed() {
                debug!("Connection attempt already in progress");
                return Ok(());
            }
            state.stopped = false;
            state.next_handle_id += 1;
            (state.attempts, state.next_handle_id)
        };

        let endpoint = self.shared.providers.borrow_mut().uri.endpoint(attempt);
        let attached = Rc::new(Cell::new(true));
        let sink = TransportSink::new(Rc::downgrade(&self.shared), attached.clone(), handle_id);
        info!(endpoint = endpoint.as_str(), attempt, "Connecting");

        match self.shared.transport.open(&endpoint, sink) {
            Ok(handle) => {
                self.shared.state.borrow_mut().link = Some(Link {
                    id: handle_id,
                    handle: Rc::from(handle),
                    attached,
                    open: false,
                });
            }
            Err(err) => {
                attached.set(false);
                warn!(endpoint = endpoint.as_str(), %err, "Failed to open transport");
                self.after_loss(false);
            }
        }
        Ok(())
    }

    /// Stops the socket.
    ///
    /// An open handle is closed and its close is processed as usual, except
    /// that no reconnect follows. A handle still opening is closed as soon as
    /// it opens. A pending reconnect is cancelled without any event.
    #[instrument(skip(self))]
    pub fn stop(&self) -> Result<(), Error> {
        let to_close = {
            let mut state = self.shared.state.borrow_mut();
            if state.destroyed {
                return Err(Error::Destroyed);
            }
            state.stopped = true;
            match &state.link {
                Some(link) if link.open => Some(link.handle.clone()),
                Some(_) => {
                    debug!("Stop requested while connecting, closing once open");
                    None
                }
                None => {
                    if state.timer.cancel() {
                        info!("Cancelled pending reconnect");
                    }
                    None
                }
            }
        };
        if let Some(handle) = to_close {
            info!("Closing transport");
            handle.close();
        }
        Ok(())
    }

    /// Stops the socket and releases everything it holds.
    ///
    /// Handlers are dropped, waiting requests fail with
    /// [`RequestError::Canceled`](crate::RequestError::Canceled), buffered
    /// messages are discarded and every plugin's [`Plugin::destroy`] runs.
    /// Afterwards every operation returns [`Error::Destroyed`].
    #[instrument(skip(self))]
    pub fn destroy(&self) -> Result<(), Error> {
        self.stop()?;

        // Abandon a handle that is still opening or closes asynchronously.
        let remaining = self.shared.state.borrow_mut().link.take();
        if let Some(link) = remaining {
            link.detach();
            link.handle.close();
        }

        self.shared.events.borrow_mut().clear();
        for plugin in &self.shared.plugins {
            plugin.destroy();
        }

        let mut state = self.shared.state.borrow_mut();
        state.destroyed = true;
        state.replies.clear();
        state.pending.clear();
        info!("Destroyed socket");
        Ok(())
    }

    // ============================================================================
    // Sending
    // ============================================================================

    /// Sends a value.
    ///
    /// The value is wrapped by the enveloper chain and encoded by the encoder
    /// chain. `Value::Null`, or a chain stage returning `None`, drops it
    /// silently. While disconnected the encoded payload is queued if
    /// buffering is on, and dropped otherwise.
    #[instrument(skip(self, value))]
    pub fn send(&self, value: Value) -> Result<(), Error> {
        self.dispatch(value, |_, _, _| ())?;
        Ok(())
    }

    /// Sends a request and returns a future for its reply.
    ///
    /// The reply is the next inbound message whose enveloped form carries the
    /// same value in the correlation field. If the wrapped request has no
    /// correlation id the future fails with
    /// [`RequestError::MissingCorrelationId`](crate::RequestError::MissingCorrelationId)
    /// after a short delay; the request is still sent.
    ///
    /// Returns `Ok(None)` when the value was dropped without being sent.
    #[instrument(skip(self, value))]
    pub fn promise(&self, value: Value) -> Result<Option<ReplyFuture>, Error> {
        let field = self.shared.settings.correlation_field.as_str();
        let timeout = self.shared.settings.reply_timeout;
        let mut registered = None;
        let result = self.dispatch(value, |state, wrapped, _| match correlation_key(wrapped, field) {
            Some(key) => {
                let reply = state.replies.register(key.clone());
                registered = Some(key.clone());
                ReplyFuture::waiting(key, reply, timeout)
            }
            None => {
                warn!(field, "Request has no correlation id");
                ReplyFuture::missing_id(field)
            }
        });
        // The future died with the failed send; its record must not linger.
        if let (Err(_), Some(key)) = (&result, registered) {
            self.shared.state.borrow_mut().replies.discard(&key);
        }
        result
    }

    // Wraps, encodes, runs `custom` against both forms, then routes the
    // encoded payload.
    fn dispatch<R>(
        &self,
        value: Value,
        custom: impl FnOnce(&mut State, &Value, &Payload) -> R,
    ) -> Result<Option<R>, Error> {
        if self.shared.state.borrow().destroyed {
            return Err(Error::Destroyed);
        }
        if value.is_null() {
            trace!("Ignoring empty message");
            return Ok(None);
        }
        let Some(wrapped) = self.shared.enveloper.wrap(value)? else {
            debug!("Enveloper dropped outbound message");
            return Ok(None);
        };
        let Some(encoded) = self.shared.encoder.encode(Payload::Value(wrapped.clone()))? else {
            debug!("Encoder dropped outbound message");
            return Ok(None);
        };

        let (result, route) = {
            let mut state = self.shared.state.borrow_mut();
            let result = custom(&mut *state, &wrapped, &encoded);
            let route = match state.open_handle() {
                Some(handle) => Route::Transmit(handle, encoded),
                None if self.shared.settings.buffer_while_disconnected => {
                    state.pending.push(encoded);
                    Route::Buffered
                }
                None => Route::Dropped,
            };
            (result, route)
        };

        match route {
            Route::Transmit(handle, payload) => {
                trace!(len = payload.byte_len(), "Sending message");
                handle.send(payload)?;
            }
            Route::Buffered => debug!(
                pending = self.pending_len(),
                "Buffered message while disconnected"
            ),
            Route::Dropped => debug!("Dropped message while disconnected"),
        }
        Ok(Some(result))
    }

    // Sends queued payloads over handle `id`, oldest first, for as long as it
    // stays the open handle.
    fn flush_pending(&self, id: u64) -> Result<(), Error> {
        let mut flushed = 0usize;
        loop {
            let (handle, payload) = {
                let mut state = self.shared.state.borrow_mut();
                let handle = state
                    .current(id)
                    .filter(|link| link.open)
                    .map(|link| link.handle.clone());
                let Some(handle) = handle else {
                    break;
                };
                let Some(payload) = state.pending.pop() else {
                    break;
                };
                (handle, payload)
            };
            handle.send(payload)?;
            flushed += 1;
        }
        if flushed > 0 {
            debug!(flushed, "Flushed buffered messages");
        }
        Ok(())
    }

    // ============================================================================
    // Handle Signals
    // ============================================================================

    fn on_open(&self, id: u64) -> Result<(), Error> {
        if self.shared.state.borrow().current(id).is_none() {
            return Ok(());
        }
        self.emit(SocketEvent::Open);

        let stopped = {
            let mut state = self.shared.state.borrow_mut();
            let Some(link) = state.link.as_mut().filter(|link| link.id == id && link.attached.get())
            else {
                return Ok(());
            };
            link.open = true;
            state.attempts = 0;
            state.stopped
        };
        {
            let mut providers = self.shared.providers.borrow_mut();
            providers.retry.next_delay(0);
            providers.uri.endpoint(0);
        }

        if stopped {
            info!("Opened after stop, closing");
            let handle = self.shared.state.borrow().open_handle();
            if let Some(handle) = handle {
                handle.close();
            }
            return Ok(());
        }

        info!("Connected");
        self.emit(SocketEvent::Connect);
        self.flush_pending(id)
    }

    fn on_message(&self, id: u64, payload: Payload) -> Result<(), Error> {
        if self.shared.state.borrow().current(id).is_none() {
            return Ok(());
        }
        if self.shared.events.borrow().len(EventKind::Message) > 0 {
            self.emit(SocketEvent::Message(payload.clone()));
        }

        let Some(decoded) = self.shared.encoder.decode(payload)? else {
            trace!("Decoder dropped inbound message");
            return Ok(());
        };
        let decoded = decoded.into_value();
        let key = correlation_key(&decoded, &self.shared.settings.correlation_field);
        let unwrapped = self.shared.enveloper.unwrap(decoded)?;

        let waiting = key.and_then(|key| {
            let sender = self.shared.state.borrow_mut().replies.take(&key)?;
            Some((key, sender))
        });
        match waiting {
            Some((key, sender)) => {
                debug!(id = key.as_str(), "Resolved pending request");
                if let Err(reply) = sender.send(unwrapped.unwrap_or(Value::Null)) {
                    self.emit(SocketEvent::Data(reply));
                }
            }
            None => match unwrapped {
                Some(data) => self.emit(SocketEvent::Data(data)),
                None => trace!("Enveloper dropped inbound message"),
            },
        }
        Ok(())
    }

    fn on_close(&self, id: u64) {
        if self.shared.state.borrow().current(id).is_none() {
            return;
        }
        self.emit(SocketEvent::Close);
        self.lose(id);
    }

    fn on_error(&self, id: u64, reason: String) {
        if self.shared.state.borrow().current(id).is_none() {
            return;
        }
        warn!(reason = reason.as_str(), "Transport error");
        self.emit(SocketEvent::Error(reason));
        self.lose(id);
    }

    // Gives up on handle `id` if it is still the current one.
    fn lose(&self, id: u64) {
        let was_open = {
            let mut state = self.shared.state.borrow_mut();
            if state.current(id).is_none() {
                return;
            }
            let Some(link) = state.link.take() else {
                return;
            };
            link.detach();
            link.open
        };
        self.after_loss(was_open);
    }

    fn after_loss(&self, was_open: bool) {
        info!(was_open, "Disconnected");
        self.emit(SocketEvent::Disconnect { was_open });
        self.schedule_reconnect();
    }

    // ============================================================================
    // Reconnection
    // ============================================================================

    fn schedule_reconnect(&self) {
        let attempt = {
            let mut state = self.shared.state.borrow_mut();
            if !self.shared.settings.auto_reconnect || state.stopped || state.destroyed {
                debug!("Not reconnecting");
                return;
            }
            if state.link.is_some() || state.timer.is_armed() {
                return;
            }
            state.attempts = state.attempts.saturating_add(1);
            state.attempts
        };

        let requested = self.shared.providers.borrow_mut().retry.next_delay(attempt);
        let delay = clamp_delay(requested);

        let weak = self.downgrade();
        let armed = self.shared.state.borrow_mut().timer.arm(delay, async move {
            if let Some(socket) = weak.upgrade() {
                socket.reconnect_now();
            }
        });
        if !armed {
            return;
        }
        info!(attempt, ?delay, "Scheduled reconnect");
        self.emit(SocketEvent::Scheduled(delay));
    }

    fn reconnect_now(&self) {
        self.shared.state.borrow_mut().timer.clear();
        if let Err(err) = self.connect() {
            debug!(%err, "Skipped reconnect");
        }
    }

    // ============================================================================
    // Events
    // ============================================================================

    /// Adds a handler for events of `kind`, after every handler already
    /// registered for it.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&SocketEvent) + 'static) -> Result<(), Error> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        let handler: Handler = Rc::new(handler);
        self.shared.events.borrow_mut().register(kind, handler);
        Ok(())
    }

    fn emit(&self, event: SocketEvent) {
        let handlers = self.shared.events.borrow().handlers(event.kind());
        trace!(event = %event.kind(), handlers = handlers.len(), "Emitting event");
        for handler in handlers {
            handler(&event);
        }
    }

    // ============================================================================
    // Inspection
    // ============================================================================

    /// The settings the socket was built with.
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        let state = self.shared.state.borrow();
        match &state.link {
            Some(link) if link.open => ConnectionState::Connected,
            Some(_) => ConnectionState::Connecting,
            None if state.timer.is_armed() => ConnectionState::Scheduled,
            None => ConnectionState::Idle,
        }
    }

    /// Whether the socket is stopped. A new socket is stopped until its
    /// first [`connect`](Self::connect).
    pub fn stopped(&self) -> bool {
        self.shared.state.borrow().stopped
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.shared.state.borrow().attempts
    }

    /// Number of messages buffered while disconnected.
    pub fn pending_len(&self) -> usize {
        self.shared.state.borrow().pending.len()
    }

    /// Number of requests waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.shared.state.borrow().replies.len()
    }

    /// Whether [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.shared.state.borrow().destroyed
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .field("pending", &self.pending_len())
            .finish()
    }
}

// ============================================================================
// Sink Entry Points
// ============================================================================

pub(crate) fn handle_open(shared: &Rc<Shared>, id: u64) -> Result<(), Error> {
    Socket {
        shared: shared.clone(),
    }
    .on_open(id)
}

pub(crate) fn handle_message(shared: &Rc<Shared>, id: u64, payload: Payload) -> Result<(), Error> {
    Socket {
        shared: shared.clone(),
    }
    .on_message(id, payload)
}

pub(crate) fn handle_close(shared: &Rc<Shared>, id: u64) -> Result<(), Error> {
    Socket {
        shared: shared.clone(),
    }
    .on_close(id);
    Ok(())
}

pub(crate) fn handle_error(shared: &Rc<Shared>, id: u64, reason: String) -> Result<(), Error> {
    Socket {
        shared: shared.clone(),
    }
    .on_error(id, reason);
    Ok(())
}
