//! Request-reply correlation on top of the socket's message stream.
//!
//! A request is any message whose enveloped form carries a correlation id.
//! [`Socket::promise`](crate::Socket::promise) records the id here before the
//! message goes out; when a decoded message with the same id comes back, its
//! record is removed and the waiting [`ReplyFuture`] completes.

use crate::error::RequestError;
use futures::channel::oneshot;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Sleep;
use tracing::{debug, warn};

/// How long a request without a correlation id waits before failing.
pub const MISSING_ID_DELAY: Duration = Duration::from_millis(200);

/// Extracts the correlation key from `value[field]`.
///
/// Strings are used as they are; numbers and booleans by their JSON text.
/// Missing, null and empty-string ids yield `None`, as do objects and arrays.
pub(crate) fn correlation_key(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        Value::Bool(id) => Some(id.to_string()),
        _ => None,
    }
}

// ============================================================================
// Correlation Registry
// ============================================================================

/// Pending requests awaiting a reply, keyed by correlation id.
#[derive(Default)]
pub(crate) struct CorrelationRegistry {
    pending: HashMap<String, oneshot::Sender<Value>>,
}

impl CorrelationRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request and returns the receiving half.
    ///
    /// A record already registered under `key` is replaced; its future fails
    /// with [`RequestError::Canceled`]. Records whose future was dropped are
    /// pruned on the way.
    pub(crate) fn register(&mut self, key: String) -> oneshot::Receiver<Value> {
        self.pending.retain(|_, sender| !sender.is_canceled());

        let (tx, rx) = oneshot::channel();
        if self.pending.insert(key.clone(), tx).is_some() {
            warn!(id = key.as_str(), "Replaced pending request with the same correlation id");
        }
        debug!(id = key.as_str(), pending = self.pending.len(), "Registered pending request");
        rx
    }

    /// Removes and returns the live record for `key`.
    ///
    /// A record whose future has been dropped is removed as well but not
    /// returned, so the reply is treated as unsolicited.
    pub(crate) fn take(&mut self, key: &str) -> Option<oneshot::Sender<Value>> {
        let sender = self.pending.remove(key)?;
        if sender.is_canceled() {
            debug!(id = key, "Reply arrived for an abandoned request");
            return None;
        }
        Some(sender)
    }

    /// Removes the record for `key` if its future is gone, as when a request
    /// failed before it left the socket. A live record is kept.
    pub(crate) fn discard(&mut self, key: &str) {
        if self.pending.get(key).is_some_and(oneshot::Sender::is_canceled) {
            self.pending.remove(key);
            debug!(id = key, "Discarded request record");
        }
    }

    /// Records whose future is still waiting.
    pub(crate) fn len(&self) -> usize {
        self.pending.values().filter(|sender| !sender.is_canceled()).count()
    }

    /// Drops every record; the waiting futures fail with `Canceled`.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}

// ============================================================================
// ReplyFuture
// ============================================================================

enum ReplyState {
    Waiting {
        id: String,
        reply: oneshot::Receiver<Value>,
        deadline: Option<(Duration, Pin<Box<Sleep>>)>,
    },
    MissingId {
        field: String,
        delay: Pin<Box<Sleep>>,
    },
    Done,
}

/// The eventual reply to a [`Socket::promise`](crate::Socket::promise) call.
///
/// Resolves with the unwrapped reply value. Dropping the future abandons the
/// request: a reply arriving later is delivered as ordinary `data`.
#[must_use = "the reply is lost unless the future is awaited"]
pub struct ReplyFuture {
    state: ReplyState,
}

impl ReplyFuture {
    pub(crate) fn waiting(
        id: String,
        reply: oneshot::Receiver<Value>,
        timeout: Option<Duration>,
    ) -> Self {
        let deadline = timeout.map(|t| (t, Box::pin(tokio::time::sleep(t))));
        Self {
            state: ReplyState::Waiting {
                id,
                reply,
                deadline,
            },
        }
    }

    pub(crate) fn missing_id(field: &str) -> Self {
        Self {
            state: ReplyState::MissingId {
                field: field.to_string(),
                delay: Box::pin(tokio::time::sleep(MISSING_ID_DELAY)),
            },
        }
    }

    /// The correlation id the reply is matched on, if the request had one.
    pub fn correlation_id(&self) -> Option<&str> {
        match &self.state {
            ReplyState::Waiting { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl Future for ReplyFuture {
    type Output = Result<Value, RequestError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = match &mut this.state {
            ReplyState::Waiting {
                id,
                reply,
                deadline,
            } => match Pin::new(reply).poll(cx) {
                Poll::Ready(Ok(value)) => Ok(value),
                Poll::Ready(Err(oneshot::Canceled)) => Err(RequestError::Canceled),
                Poll::Pending => {
                    let Some((timeout, sleep)) = deadline else {
                        return Poll::Pending;
                    };
                    if sleep.as_mut().poll(cx).is_pending() {
                        return Poll::Pending;
                    }
                    debug!(id = id.as_str(), ?timeout, "Request timed out");
                    Err(RequestError::TimedOut(*timeout))
                }
            },
            ReplyState::MissingId { field, delay } => match delay.as_mut().poll(cx) {
                Poll::Ready(()) => Err(RequestError::MissingCorrelationId {
                    field: std::mem::take(field),
                }),
                Poll::Pending => return Poll::Pending,
            },
            ReplyState::Done => panic!("ReplyFuture polled after completion"),
        };
        // Dropping the receiver here lets the registry prune the record.
        this.state = ReplyState::Done;
        Poll::Ready(result)
    }
}

impl std::fmt::Debug for ReplyFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            ReplyState::Waiting { .. } => "waiting",
            ReplyState::MissingId { .. } => "missing-id",
            ReplyState::Done => "done",
        };
        f.debug_struct("ReplyFuture")
            .field("correlation_id", &self.correlation_id())
            .field("state", &state)
            .finish()
    }
}
