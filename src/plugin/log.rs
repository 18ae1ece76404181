use super::Plugin;
use crate::codec::Payload;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Logs every socket event through `tracing`.
///
/// Connection lifecycle events are logged at `info`, errors at `warn`, data
/// at `debug` and raw payloads at `trace`, all under the
/// `rustsock::plugin` target.
#[derive(Debug, Clone, Default)]
pub struct LogPlugin {
    label: Option<String>,
}

impl LogPlugin {
    /// Creates a log plugin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log plugin that tags every record with `label`.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }

    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("socket")
    }
}

impl Plugin for LogPlugin {
    fn on_open(&self) {
        info!(target: "rustsock::plugin", socket = self.label(), "Transport opened");
    }

    fn on_message(&self, payload: &Payload) {
        trace!(target: "rustsock::plugin", socket = self.label(), ?payload, "Raw message");
    }

    fn on_close(&self) {
        info!(target: "rustsock::plugin", socket = self.label(), "Transport closed");
    }

    fn on_error(&self, reason: &str) {
        warn!(target: "rustsock::plugin", socket = self.label(), reason, "Transport error");
    }

    fn on_connect(&self) {
        info!(target: "rustsock::plugin", socket = self.label(), "Connected");
    }

    fn on_disconnect(&self, was_open: bool) {
        info!(target: "rustsock::plugin", socket = self.label(), was_open, "Disconnected");
    }

    fn on_data(&self, data: &Value) {
        debug!(target: "rustsock::plugin", socket = self.label(), %data, "Data");
    }

    fn on_scheduled(&self, delay: Duration) {
        info!(target: "rustsock::plugin", socket = self.label(), ?delay, "Reconnect scheduled");
    }
}
