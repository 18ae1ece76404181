//! RustSock - a resilient duplex message socket for Rust
//!
//! RustSock keeps a message connection alive on top of any transport that can
//! open, send, close and report. It reconnects after failures with pluggable
//! delay and endpoint policies, buffers messages while disconnected, runs
//! outbound values through composable enveloper and encoder chains, matches
//! replies to requests by correlation id, and fans connection events out to
//! handlers and plugins.
//!
//! Everything runs on one thread inside a [`tokio::task::LocalSet`].

// Internal-only modules
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod events;
pub(crate) mod plugin;
pub(crate) mod req_resp;
pub(crate) mod socket;

// Extension points with their stock implementations
pub mod codec;
pub mod envelope;
pub mod retry;
pub mod transport;

// These are the intended public API
pub use codec::{Encoder, JsonEncoder, Payload};
pub use envelope::Enveloper;
#[cfg(feature = "id-enveloper")]
pub use envelope::IdEnveloper;
pub use error::{Error, RequestError};
pub use events::{EventKind, Handler, SocketEvent};
pub use plugin::{LogPlugin, Plugin};
pub use req_resp::{ReplyFuture, MISSING_ID_DELAY};
pub use retry::{
    FixedDelay, FixedEndpoint, RetryProvider, RotatingEndpoints, StepBackoff, UriProvider,
    DEFAULT_RETRY_DELAY,
};
pub use socket::{
    ConnectionState, Settings, Socket, SocketOptions, WeakSocket, DEFAULT_CORRELATION_FIELD,
};
pub use transport::{Transport, TransportHandle, TransportSink};

/// Convenient re-exports of commonly used types.
pub mod prelude {
    pub use crate::codec::{Encoder, JsonEncoder, Payload};
    pub use crate::envelope::Enveloper;
    #[cfg(feature = "id-enveloper")]
    pub use crate::envelope::IdEnveloper;
    pub use crate::error::{Error, RequestError};
    pub use crate::events::{EventKind, SocketEvent};
    pub use crate::plugin::{LogPlugin, Plugin};
    pub use crate::retry::{FixedDelay, RotatingEndpoints, StepBackoff};
    pub use crate::socket::{ConnectionState, Socket, SocketOptions, WeakSocket};
    pub use crate::transport::{Transport, TransportHandle, TransportSink};
}
