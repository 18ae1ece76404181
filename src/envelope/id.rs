use super::{Enveloper, PassThrough};
use crate::error::Error;
use serde_json::{Map, Value};
use tracing::trace;

type IdGenerator = Box<dyn Fn() -> String>;

/// Envelopes every outbound value together with a freshly generated
/// correlation id.
///
/// With the default field names, `{"action": "ping"}` is sent as
///
/// ```json
/// {"data": {"action": "ping"}, "id": "5f0c...-uuid"}
/// ```
///
/// and a reply `{"id": "...", "data": {"pong": true}}` unwraps to
/// `{"pong": true}`. Fields listed with [`IdEnveloper::elevate`] are copied
/// from the value to the top level of the envelope when wrapping, and back
/// into the value when unwrapping.
///
/// # Example
///
/// ```
/// use rustsock::{Enveloper, IdEnveloper};
/// use serde_json::json;
///
/// let enveloper = IdEnveloper::new().elevate(["topic"]);
/// let wrapped = enveloper
///     .wrap(json!({"topic": "news", "text": "hi"}))
///     .unwrap()
///     .unwrap();
/// assert_eq!(wrapped["topic"], "news");
/// assert!(wrapped["id"].is_string());
/// ```
pub struct IdEnveloper {
    id_field: String,
    data_field: String,
    elevate: Vec<String>,
    generate_id: IdGenerator,
    inner: Box<dyn Enveloper>,
}

impl IdEnveloper {
    /// Creates an enveloper using the `id` and `data` fields and UUID v4 ids.
    pub fn new() -> Self {
        Self {
            id_field: "id".to_string(),
            data_field: "data".to_string(),
            elevate: Vec::new(),
            generate_id: Box::new(|| uuid::Uuid::new_v4().to_string()),
            inner: Box::new(PassThrough),
        }
    }

    /// Sets the envelope field that carries the correlation id.
    ///
    /// Keep this in sync with the socket's correlation field.
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Sets the envelope field that carries the application value.
    pub fn data_field(mut self, field: impl Into<String>) -> Self {
        self.data_field = field.into();
        self
    }

    /// Sets the fields copied between the value and the envelope top level.
    pub fn elevate<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elevate = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the id generator.
    pub fn id_generator(mut self, generate: impl Fn() -> String + 'static) -> Self {
        self.generate_id = Box::new(generate);
        self
    }

    /// Chains `inner`: it wraps before this enveloper and unwraps after it.
    pub fn wrapping(mut self, inner: impl Enveloper + 'static) -> Self {
        self.inner = Box::new(inner);
        self
    }

    fn copy_elevated(&self, from: &Value, to: &mut Map<String, Value>) {
        let Some(from) = from.as_object() else {
            return;
        };
        for field in self.elevate.iter().filter(|f| **f != self.data_field) {
            if let Some(value) = from.get(field) {
                to.insert(field.clone(), value.clone());
            }
        }
    }
}

impl Default for IdEnveloper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdEnveloper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdEnveloper")
            .field("id_field", &self.id_field)
            .field("data_field", &self.data_field)
            .field("elevate", &self.elevate)
            .finish_non_exhaustive()
    }
}

impl Enveloper for IdEnveloper {
    fn wrap(&self, value: Value) -> Result<Option<Value>, Error> {
        let Some(data) = self.inner.wrap(value)? else {
            return Ok(None);
        };
        let id = (self.generate_id)();
        trace!(%id, "Enveloping message");

        let mut envelope = Map::new();
        self.copy_elevated(&data, &mut envelope);
        envelope.insert(self.id_field.clone(), Value::String(id));
        envelope.insert(self.data_field.clone(), data);
        Ok(Some(Value::Object(envelope)))
    }

    fn unwrap(&self, value: Value) -> Result<Option<Value>, Error> {
        let mut data = match value.get(&self.data_field) {
            Some(data) if !data.is_null() => data.clone(),
            _ => Value::Object(Map::new()),
        };
        if let Value::Object(fields) = &mut data {
            self.copy_elevated(&value, fields);
        }
        self.inner.unwrap(data)
    }
}
