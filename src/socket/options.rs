use crate::codec::{Encoder, JsonEncoder};
use crate::config::{get_namespaced_bool, get_namespaced_string, get_namespaced_u64};
use crate::envelope::{self, Enveloper};
use crate::error::Error;
use crate::events::{EventKind, Handler, SocketEvent};
use crate::plugin::Plugin;
use crate::retry::{FixedDelay, FixedEndpoint, RetryProvider, UriProvider};
use crate::transport::Transport;
use ::config::Config;
use serde_json::Value;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// The correlation field used when none is configured.
pub const DEFAULT_CORRELATION_FIELD: &str = "id";

/// The scalar settings a socket runs with. Fixed once the socket is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Queue messages sent while disconnected and deliver them on the next
    /// open. Default `true`.
    pub buffer_while_disconnected: bool,
    /// Reconnect after losing the transport. Default `true`.
    pub auto_reconnect: bool,
    /// Envelope field holding the correlation id of requests and replies.
    /// Default `"id"`.
    pub correlation_field: String,
    /// How long a request waits for its reply. Default `None`: forever.
    pub reply_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            buffer_while_disconnected: true,
            auto_reconnect: true,
            correlation_field: DEFAULT_CORRELATION_FIELD.to_string(),
            reply_timeout: None,
        }
    }
}

/// Builder for a [`Socket`](crate::Socket).
///
/// Only a transport and an endpoint are required; everything else has a
/// default:
///
/// | option                      | default                         |
/// |-----------------------------|---------------------------------|
/// | `buffer_while_disconnected` | `true`                          |
/// | `auto_reconnect`            | `true`                          |
/// | `correlation_field`         | `"id"`                          |
/// | `retry_provider`            | [`FixedDelay`] of one second    |
/// | `encoder`                   | [`JsonEncoder`]                 |
/// | `enveloper`                 | pass-through                    |
/// | `reply_timeout`             | none                            |
///
/// # Example
///
/// ```
/// use rustsock::transport::memory::MemoryTransport;
/// use rustsock::{SocketOptions, StepBackoff};
///
/// let options = SocketOptions::new()
///     .transport(MemoryTransport::new())
///     .endpoint("ws://localhost:9000/ws")
///     .retry_provider(StepBackoff::default())
///     .on_connect(|| println!("connected"));
/// ```
pub struct SocketOptions {
    pub(super) settings: Settings,
    pub(super) transport: Option<Rc<dyn Transport>>,
    pub(super) uri_provider: Option<Box<dyn UriProvider>>,
    pub(super) retry_provider: Box<dyn RetryProvider>,
    pub(super) encoder: Box<dyn Encoder>,
    pub(super) enveloper: Box<dyn Enveloper>,
    pub(super) plugins: Vec<Rc<dyn Plugin>>,
    pub(super) handlers: Vec<(EventKind, Handler)>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            transport: None,
            uri_provider: None,
            retry_provider: Box::new(FixedDelay::default()),
            encoder: Box::new(JsonEncoder::new()),
            enveloper: Box::new(envelope::PassThrough),
            plugins: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

impl SocketOptions {
    /// Creates options with every default in place.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options from configuration.
    ///
    /// Configuration lookup follows this priority:
    /// 1. `{name}.{key}` (e.g., `market_feed.auto_reconnect`)
    /// 2. `{key}` (e.g., `auto_reconnect`)
    /// 3. The built-in default
    ///
    /// # Configuration Keys
    ///
    /// - `buffer_while_disconnected`: bool
    /// - `auto_reconnect`: bool
    /// - `correlation_field`: string
    /// - `endpoint`: string, a fixed endpoint
    /// - `retry_delay_ms`: integer, a fixed retry delay
    /// - `reply_timeout_ms`: integer
    ///
    /// The transport, codecs, plugins and handlers are not configurable this
    /// way; add them to the returned options.
    ///
    /// # Example
    ///
    /// ```toml
    /// auto_reconnect = true
    ///
    /// [market_feed]
    /// endpoint = "wss://feed.example.com/ws"
    /// retry_delay_ms = 250
    /// ```
    pub fn from_config(config: &Config, name: &str) -> Result<Self, Error> {
        let mut options = Self::new();

        if let Some(buffer) = get_namespaced_bool(config, name, "buffer_while_disconnected")? {
            options.settings.buffer_while_disconnected = buffer;
        }
        if let Some(reconnect) = get_namespaced_bool(config, name, "auto_reconnect")? {
            options.settings.auto_reconnect = reconnect;
        }
        if let Some(field) = get_namespaced_string(config, name, "correlation_field")? {
            options.settings.correlation_field = field;
        }
        if let Some(endpoint) = get_namespaced_string(config, name, "endpoint")? {
            options.uri_provider = Some(Box::new(FixedEndpoint(endpoint)));
        }
        if let Some(delay) = get_namespaced_u64(config, name, "retry_delay_ms")? {
            options.retry_provider = Box::new(FixedDelay(Duration::from_millis(delay)));
        }
        if let Some(timeout) = get_namespaced_u64(config, name, "reply_timeout_ms")? {
            options.settings.reply_timeout = Some(Duration::from_millis(timeout));
        }

        debug!(name, settings = ?options.settings, "Loaded socket options from configuration");
        Ok(options)
    }

    /// The settings collected so far.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ============================================================================
    // Collaborators
    // ============================================================================

    /// Sets the transport connections are opened with.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Rc::new(transport));
        self
    }

    /// Connects to a single fixed endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.uri_provider = Some(Box::new(FixedEndpoint(endpoint.into())));
        self
    }

    /// Chooses the endpoint for each attempt.
    pub fn uri_provider(mut self, provider: impl UriProvider + 'static) -> Self {
        self.uri_provider = Some(Box::new(provider));
        self
    }

    /// Chooses the delay before each reconnection attempt.
    pub fn retry_provider(mut self, provider: impl RetryProvider + 'static) -> Self {
        self.retry_provider = Box::new(provider);
        self
    }

    /// Sets the encoder chain.
    pub fn encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoder = Box::new(encoder);
        self
    }

    /// Sets the enveloper chain.
    pub fn enveloper(mut self, enveloper: impl Enveloper + 'static) -> Self {
        self.enveloper = Box::new(enveloper);
        self
    }

    /// Adds a plugin. Plugins see events in the order they were added.
    pub fn plugin(mut self, plugin: Rc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    // ============================================================================
    // Settings
    // ============================================================================

    /// Enables or disables buffering while disconnected.
    pub fn buffer_while_disconnected(mut self, buffer: bool) -> Self {
        self.settings.buffer_while_disconnected = buffer;
        self
    }

    /// Enables or disables automatic reconnection.
    pub fn auto_reconnect(mut self, reconnect: bool) -> Self {
        self.settings.auto_reconnect = reconnect;
        self
    }

    /// Sets the envelope field holding correlation ids.
    pub fn correlation_field(mut self, field: impl Into<String>) -> Self {
        self.settings.correlation_field = field.into();
        self
    }

    /// Fails requests whose reply takes longer than `timeout`.
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.settings.reply_timeout = Some(timeout);
        self
    }

    // ============================================================================
    // Handlers
    // ============================================================================

    /// Adds a handler for events of `kind`. Handlers run after plugins, in
    /// the order they were added.
    pub fn on(mut self, kind: EventKind, handler: impl Fn(&SocketEvent) + 'static) -> Self {
        let handler: Handler = Rc::new(handler);
        self.handlers.push((kind, handler));
        self
    }

    /// Adds a `connect` handler.
    pub fn on_connect(self, handler: impl Fn() + 'static) -> Self {
        self.on(EventKind::Connect, move |_| handler())
    }

    /// Adds a `disconnect` handler; it receives whether the lost handle had
    /// opened.
    pub fn on_disconnect(self, handler: impl Fn(bool) + 'static) -> Self {
        self.on(EventKind::Disconnect, move |event| {
            if let SocketEvent::Disconnect { was_open } = event {
                handler(*was_open);
            }
        })
    }

    /// Adds a `data` handler.
    pub fn on_data(self, handler: impl Fn(&Value) + 'static) -> Self {
        self.on(EventKind::Data, move |event| {
            if let SocketEvent::Data(data) = event {
                handler(data);
            }
        })
    }

    /// Adds a `scheduled` handler; it receives the reconnection delay.
    pub fn on_scheduled(self, handler: impl Fn(Duration) + 'static) -> Self {
        self.on(EventKind::Scheduled, move |event| {
            if let SocketEvent::Scheduled(delay) = event {
                handler(*delay);
            }
        })
    }

    pub(super) fn validate(&self) -> Result<(), Error> {
        if self.transport.is_none() {
            return Err(Error::MissingOption("transport"));
        }
        if self.uri_provider.is_none() {
            return Err(Error::MissingOption("uri_provider"));
        }
        if self.settings.correlation_field.is_empty() {
            return Err(Error::InvalidOption {
                key: "correlation_field",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
