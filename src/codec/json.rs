use super::{Encoder, PassThrough, Payload};
use crate::error::Error;
use serde_json::Value;
use tracing::trace;

/// JSON encoder, optionally wrapping an inner encoder.
///
/// Encoding serializes a structured value to JSON text and hands the text to
/// the inner encoder. Decoding runs the inner encoder first and then parses
/// whatever text or bytes it produced.
pub struct JsonEncoder {
    inner: Box<dyn Encoder>,
}

impl JsonEncoder {
    /// Creates a JSON encoder over [`PassThrough`].
    pub fn new() -> Self {
        Self::wrapping(PassThrough)
    }

    /// Creates a JSON encoder that feeds its output into `inner`.
    pub fn wrapping(inner: impl Encoder + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JsonEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonEncoder").finish_non_exhaustive()
    }
}

impl Encoder for JsonEncoder {
    fn encode(&self, payload: Payload) -> Result<Option<Payload>, Error> {
        let text = match payload {
            Payload::Value(Value::Null) => return Ok(None),
            Payload::Value(value) => serde_json::to_string(&value)
                .map_err(|err| Error::Encode(format!("value is not serializable: {err}")))?,
            // Already serialized further up the chain.
            other => return self.inner.encode(other),
        };
        trace!(len = text.len(), "Encoded JSON payload");
        self.inner.encode(Payload::Text(text))
    }

    fn decode(&self, payload: Payload) -> Result<Option<Payload>, Error> {
        let decoded = match self.inner.decode(payload)? {
            Some(Payload::Text(text)) => serde_json::from_str::<Value>(&text)
                .map_err(|err| Error::Decode(format!("text frame is not JSON: {err}")))?,
            Some(Payload::Binary(bytes)) => serde_json::from_slice::<Value>(&bytes)
                .map_err(|err| Error::Decode(format!("binary frame is not JSON: {err}")))?,
            Some(Payload::Value(value)) => value,
            None => return Ok(None),
        };
        Ok(Some(Payload::Value(decoded)))
    }
}
