//! Shared helpers for the integration tests.
//!
//! # Running with tracing
//!
//! Use TEST_LOG environment variable to control tracing verbosity (like -v, -vv, -vvv):
//!
//! ```bash
//! TEST_LOG=2 cargo test --test lifecycle -- --nocapture
//! ```

#![allow(dead_code)]

use rustsock::prelude::*;
use rustsock::transport::memory::{MemoryConnection, MemoryTransport};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Once;

static INIT: Once = Once::new();

// ============================================================================
// Tracing Initialization
// ============================================================================

/// Initialize tracing based on TEST_LOG environment variable
///
/// Verbosity levels (like -v, -vv, -vvv):
/// - TEST_LOG=1: Info level
/// - TEST_LOG=2: Debug level
/// - TEST_LOG=3: Trace level
pub fn init_tracing() {
    INIT.call_once(|| {
        if let Ok(level_str) = std::env::var("TEST_LOG") {
            let verbosity = level_str.parse::<u8>().unwrap_or(0);

            if verbosity > 0 {
                let level = match verbosity {
                    1 => "info",
                    2 => "debug",
                    _ => "trace", // 3 or more
                };

                let filter = format!("rustsock={}", level);
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                    .with_target(true)
                    .with_test_writer()
                    .try_init();
            }
        }
    });
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Runs `future` on a fresh `LocalSet`, which the socket's timers need.
pub async fn local<F: Future>(future: F) -> F::Output {
    init_tracing();
    tokio::task::LocalSet::new().run_until(future).await
}

/// Lets spawned local tasks run.
pub async fn settle() {
    tokio::task::yield_now().await;
}

/// Records every event the socket emits, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<SocketEvent>>>,
}

impl EventLog {
    /// Registers the log for every event kind.
    pub fn install(&self, mut options: SocketOptions) -> SocketOptions {
        for kind in EventKind::ALL {
            let events = self.events.clone();
            options = options.on(kind, move |event| events.borrow_mut().push(event.clone()));
        }
        options
    }

    pub fn events(&self) -> Vec<SocketEvent> {
        self.events.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.borrow().iter().map(SocketEvent::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.borrow().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

/// Options over `transport` with a fixed endpoint.
pub fn options(transport: &MemoryTransport) -> SocketOptions {
    SocketOptions::new()
        .transport(transport.clone())
        .endpoint("ws://test.local/ws")
}

/// Builds a socket over `transport` with an event log attached.
pub fn socket_with(
    transport: &MemoryTransport,
    configure: impl FnOnce(SocketOptions) -> SocketOptions,
) -> (Socket, EventLog) {
    let log = EventLog::default();
    let options = log.install(configure(options(transport)));
    let socket = Socket::new(options).expect("Failed to build socket");
    (socket, log)
}

/// Connects `socket` and completes the handshake on the new connection.
pub fn connect_and_accept(socket: &Socket, transport: &MemoryTransport) -> MemoryConnection {
    socket.connect().expect("Failed to connect");
    let connection = transport
        .last_connection()
        .expect("No connection was opened");
    connection.accept().expect("Failed to accept");
    connection
}
