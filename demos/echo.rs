//! Echo example - requests over a flaky transport
//!
//! This example runs a socket against an in-process echo transport that
//! hangs up after every second message, to show the socket riding through
//! disconnects.
//!
//! ## What it shows
//!
//! - A custom [`rustsock::Transport`] driven by tokio timers
//! - Requests issued while disconnected are buffered and answered later
//! - Replies matched to requests by the ids [`rustsock::IdEnveloper`] stamps
//! - Reconnection with [`rustsock::StepBackoff`]
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=rustsock=info cargo run --example echo
//! ```

use rustsock::prelude::*;
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::{spawn_local, LocalSet};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

/// Messages an echo connection answers before it hangs up.
const MESSAGES_PER_CONNECTION: u32 = 2;

#[derive(Default)]
struct EchoTransport {
    opened: Cell<usize>,
}

impl Transport for EchoTransport {
    fn open(&self, endpoint: &str, sink: TransportSink) -> Result<Box<dyn TransportHandle>, Error> {
        self.opened.set(self.opened.get() + 1);
        println!("opening {endpoint} (connection #{})", self.opened.get());

        let handle = EchoHandle {
            sink: sink.clone(),
            open: Rc::new(Cell::new(false)),
            remaining: Cell::new(MESSAGES_PER_CONNECTION),
        };
        let open = handle.open.clone();
        spawn_local(async move {
            sleep(Duration::from_millis(50)).await;
            open.set(true);
            let _ = sink.opened();
        });
        Ok(Box::new(handle))
    }
}

struct EchoHandle {
    sink: TransportSink,
    open: Rc<Cell<bool>>,
    remaining: Cell<u32>,
}

impl TransportHandle for EchoHandle {
    fn send(&self, payload: Payload) -> Result<(), Error> {
        if !self.open.get() {
            return Err(Error::Transport("echo connection is not open".to_string()));
        }
        let remaining = self.remaining.get().saturating_sub(1);
        self.remaining.set(remaining);

        let sink = self.sink.clone();
        let open = self.open.clone();
        spawn_local(async move {
            sleep(Duration::from_millis(10)).await;
            if let Err(err) = sink.message(payload) {
                eprintln!("echo delivery failed: {err}");
            }
            if remaining == 0 && open.replace(false) {
                println!("echo server hangs up");
                let _ = sink.closed();
            }
        });
        Ok(())
    }

    fn close(&self) {
        if self.open.replace(false) {
            let sink = self.sink.clone();
            spawn_local(async move {
                let _ = sink.closed();
            });
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let socket = Socket::new(
        SocketOptions::new()
            .transport(EchoTransport::default())
            .endpoint("echo://demo")
            .enveloper(IdEnveloper::new())
            .retry_provider(StepBackoff::new(
                [100, 250].map(Duration::from_millis),
            ))
            .plugin(Rc::new(LogPlugin::labeled("echo")))
            .on_connect(|| println!("connected"))
            .on_disconnect(|was_open| println!("disconnected (was open: {was_open})"))
            .on_scheduled(|delay| println!("reconnecting in {delay:?}")),
    )?;

    socket.connect()?;
    for n in 1..=5 {
        let reply = socket
            .promise(json!({"n": n, "text": format!("hello #{n}")}))?
            .ok_or("request was dropped")?;
        let value = reply.await?;
        println!("reply {n}: {value}");
    }

    socket.destroy()?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    LocalSet::new().run_until(run()).await
}
