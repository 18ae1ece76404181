//! Reconnection policy: how long to wait, where to connect, and the single
//! reconnect timer.
//!
//! Both providers receive the attempt counter. The socket resets the counter
//! to zero when a connection opens and then calls each provider once with
//! `0`, so stateful providers can use `attempt == 0` to reset themselves.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// The delay used by [`FixedDelay::default`].
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Computes the delay before the next connection attempt.
pub trait RetryProvider {
    /// Returns the delay in milliseconds before attempt number `attempt`.
    /// Negative values are treated as zero.
    fn next_delay(&mut self, attempt: u32) -> i64;
}

impl<F> RetryProvider for F
where
    F: FnMut(u32) -> i64,
{
    fn next_delay(&mut self, attempt: u32) -> i64 {
        self(attempt)
    }
}

/// Picks the endpoint for the next connection attempt.
pub trait UriProvider {
    /// Returns the endpoint for attempt number `attempt`.
    fn endpoint(&mut self, attempt: u32) -> String;
}

impl<F> UriProvider for F
where
    F: FnMut(u32) -> String,
{
    fn endpoint(&mut self, attempt: u32) -> String {
        self(attempt)
    }
}

// Converts a provider result to a timer delay.
pub(crate) fn clamp_delay(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

// ============================================================================
// Retry Providers
// ============================================================================

/// Waits the same amount of time before every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl Default for FixedDelay {
    fn default() -> Self {
        FixedDelay(DEFAULT_RETRY_DELAY)
    }
}

impl RetryProvider for FixedDelay {
    fn next_delay(&mut self, _attempt: u32) -> i64 {
        i64::try_from(self.0.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Walks through a list of delays and then keeps repeating the last one.
///
/// The walk starts over when the socket reports a successful connection
/// (attempt `0`).
///
/// ```
/// use rustsock::{RetryProvider, StepBackoff};
/// use std::time::Duration;
///
/// let mut backoff = StepBackoff::new([1000, 2500, 5000].map(Duration::from_millis));
/// assert_eq!(backoff.next_delay(1), 1000);
/// assert_eq!(backoff.next_delay(2), 2500);
/// assert_eq!(backoff.next_delay(3), 5000);
/// assert_eq!(backoff.next_delay(4), 5000);
/// assert_eq!(backoff.next_delay(0), 0);
/// assert_eq!(backoff.next_delay(1), 1000);
/// ```
#[derive(Debug, Clone)]
pub struct StepBackoff {
    steps: Vec<Duration>,
    remaining: VecDeque<Duration>,
}

impl StepBackoff {
    /// Creates a backoff over `steps`. An empty list means no delay.
    pub fn new(steps: impl IntoIterator<Item = Duration>) -> Self {
        let steps: Vec<Duration> = steps.into_iter().collect();
        Self {
            remaining: steps.iter().copied().collect(),
            steps,
        }
    }
}

impl Default for StepBackoff {
    fn default() -> Self {
        Self::new([1000, 2500, 5000, 10000].map(Duration::from_millis))
    }
}

impl RetryProvider for StepBackoff {
    fn next_delay(&mut self, attempt: u32) -> i64 {
        if attempt == 0 {
            self.remaining = self.steps.iter().copied().collect();
            return 0;
        }
        let delay = if self.remaining.len() > 1 {
            self.remaining.pop_front()
        } else {
            self.remaining.front().copied()
        };
        delay.map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }
}

// ============================================================================
// Uri Providers
// ============================================================================

/// Always connects to the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedEndpoint(pub String);

impl UriProvider for FixedEndpoint {
    fn endpoint(&mut self, _attempt: u32) -> String {
        self.0.clone()
    }
}

/// Fails over through a list of endpoints.
///
/// Attempt `0` (the very first connection, and the reset the socket issues
/// after each successful open) selects the first endpoint; every later
/// attempt moves on to the next one, wrapping around.
///
/// ```
/// use rustsock::{RotatingEndpoints, UriProvider};
///
/// let mut uris = RotatingEndpoints::new(["ws://primary", "ws://backup"]);
/// assert_eq!(uris.endpoint(0), "ws://primary");
/// assert_eq!(uris.endpoint(1), "ws://backup");
/// assert_eq!(uris.endpoint(2), "ws://primary");
/// ```
#[derive(Debug, Clone)]
pub struct RotatingEndpoints {
    endpoints: Vec<String>,
    cursor: usize,
}

impl RotatingEndpoints {
    /// Creates a rotation over `endpoints`.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            cursor: 0,
        }
    }
}

impl UriProvider for RotatingEndpoints {
    fn endpoint(&mut self, attempt: u32) -> String {
        if self.endpoints.is_empty() {
            return String::new();
        }
        if attempt == 0 {
            self.cursor = 0;
        } else {
            self.cursor = (self.cursor + 1) % self.endpoints.len();
        }
        self.endpoints[self.cursor].clone()
    }
}

// ============================================================================
// Reconnect Timer
// ============================================================================

// The single reconnect timer slot. Arming it spawns a local task; the task
// is expected to call `clear` before it acts so that the slot reads empty.
#[derive(Default)]
pub(crate) struct ReconnectTimer {
    task: Option<JoinHandle<()>>,
}

impl ReconnectTimer {
    pub(crate) fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    // Arms the timer unless it already is. Returns whether it was armed now.
    pub(crate) fn arm<F>(&mut self, delay: Duration, on_fire: F) -> bool
    where
        F: Future<Output = ()> + 'static,
    {
        if self.task.is_some() {
            return false;
        }
        trace!(?delay, "Arming reconnect timer");
        self.task = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        }));
        true
    }

    pub(crate) fn clear(&mut self) {
        self.task = None;
    }

    // Cancels a pending timer. Returns whether one was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}
