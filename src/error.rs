use std::time::Duration;
use thiserror::Error;

/// The error type for rustsock operations.
///
/// Covers construction problems (missing or invalid options), failures in
/// the encoder/enveloper pipeline, and errors reported by a transport.
///
/// Losing a connection is not an error: the socket reports it through the
/// `disconnect` event and reconnects on its own. Errors are reserved for
/// things the caller has to react to.
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Lifecycle Errors
    // ============================================================================

    /// The socket was destroyed and can no longer be used.
    #[error("Socket has been destroyed")]
    Destroyed,

    // ============================================================================
    // Option Errors
    // ============================================================================

    /// A required option was not supplied when building the socket.
    #[error("Missing required option '{0}'")]
    MissingOption(&'static str),

    /// An option was supplied with a value the socket cannot use.
    #[error("Invalid value for option '{key}': {reason}")]
    InvalidOption {
        /// The option name.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Configuration lookup failed or a key had the wrong type.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // ============================================================================
    // Pipeline Errors
    // ============================================================================

    /// An encoder or enveloper could not produce an outbound payload.
    #[error("Failed to encode message: {0}")]
    Encode(String),

    /// An encoder or enveloper could not make sense of an inbound payload.
    #[error("Failed to decode message: {0}")]
    Decode(String),

    // ============================================================================
    // Transport Errors
    // ============================================================================

    /// The transport failed to open a handle or to send a payload.
    #[error("Transport error: {0}")]
    Transport(String),
}

// ============================================================================
// Request-Reply Errors
// ============================================================================

/// Errors produced by a [`ReplyFuture`](crate::ReplyFuture).
///
/// A reply future either resolves with the unwrapped reply value or fails
/// with one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The wrapped message carried no correlation id, so no reply can ever
    /// be matched to it. The message itself was still sent or buffered.
    #[error("Enveloped message did not have a correlation id in field '{field}'")]
    MissingCorrelationId {
        /// The configured correlation field.
        field: String,
    },

    /// The pending reply was dropped before a reply arrived.
    ///
    /// This happens when another request registers the same correlation id
    /// or when the socket is destroyed.
    #[error("Request was canceled before a reply arrived")]
    Canceled,

    /// No reply arrived within the configured reply timeout.
    #[error("No reply within {0:?}")]
    TimedOut(Duration),
}
