//! Outbound and inbound message processing: buffering, encoders and
//! envelopers.

mod common;

use common::*;
use rustsock::codec::PassThrough;
use rustsock::prelude::*;
use rustsock::transport::memory::MemoryTransport;
use serde_json::{json, Value};

// ============================================================================
// Test Codecs
// ============================================================================

/// Prefixes text payloads with a version tag and drops untagged input.
struct Versioned {
    inner: Box<dyn Encoder>,
}

impl Versioned {
    fn new() -> Self {
        Self {
            inner: Box::new(PassThrough),
        }
    }
}

impl Encoder for Versioned {
    fn encode(&self, payload: Payload) -> Result<Option<Payload>, Error> {
        let Payload::Text(text) = payload else {
            return Err(Error::Encode("expected text".to_string()));
        };
        self.inner.encode(Payload::Text(format!("v1:{text}")))
    }

    fn decode(&self, payload: Payload) -> Result<Option<Payload>, Error> {
        let Some(Payload::Text(text)) = self.inner.decode(payload)? else {
            return Ok(None);
        };
        Ok(text.strip_prefix("v1:").map(|rest| Payload::Text(rest.to_string())))
    }
}

/// Refuses to send anything marked private and hides heartbeats.
struct Filter;

impl Enveloper for Filter {
    fn wrap(&self, value: Value) -> Result<Option<Value>, Error> {
        if value["private"] == json!(true) {
            return Ok(None);
        }
        Ok(Some(value))
    }

    fn unwrap(&self, value: Value) -> Result<Option<Value>, Error> {
        if value["type"] == "heartbeat" {
            return Ok(None);
        }
        Ok(Some(value))
    }
}

fn data_events(log: &EventLog) -> Vec<Value> {
    log.events()
        .into_iter()
        .filter_map(|event| match event {
            SocketEvent::Data(data) => Some(data),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Outbound
// ============================================================================

#[tokio::test(start_paused = true)]
async fn send_encodes_values_as_json_text() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| o);
        let connection = connect_and_accept(&socket, &transport);

        socket.send(json!({"op": "subscribe", "channel": 7})).unwrap();

        assert_eq!(
            connection.sent_text(),
            vec![r#"{"channel":7,"op":"subscribe"}"#]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn messages_sent_while_disconnected_are_flushed_in_order() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| o);

        for n in 1..=3 {
            socket.send(json!(n)).unwrap();
        }
        assert_eq!(socket.pending_len(), 3);

        socket.connect().unwrap();
        socket.send(json!(4)).unwrap();
        assert_eq!(socket.pending_len(), 4);

        let connection = transport.last_connection().unwrap();
        connection.accept().unwrap();

        assert_eq!(connection.sent_text(), vec!["1", "2", "3", "4"]);
        assert_eq!(socket.pending_len(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn buffer_survives_a_failed_attempt() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| o);

        socket.connect().unwrap();
        socket.send(json!("hello")).unwrap();
        transport.last_connection().unwrap().fail("refused").unwrap();
        assert_eq!(socket.pending_len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(1001)).await;
        let connection = transport.last_connection().unwrap();
        connection.accept().unwrap();

        assert_eq!(connection.sent_text(), vec![r#""hello""#]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn connect_handlers_send_before_the_buffer_drains() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| o);
        let weak = socket.downgrade();
        socket
            .on(EventKind::Connect, move |_| {
                if let Some(socket) = weak.upgrade() {
                    socket.send(json!({"op": "auth"})).unwrap();
                }
            })
            .unwrap();

        socket.send(json!({"op": "subscribe"})).unwrap();
        let connection = connect_and_accept(&socket, &transport);

        assert_eq!(
            connection.sent_text(),
            vec![r#"{"op":"auth"}"#, r#"{"op":"subscribe"}"#]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn messages_are_dropped_while_disconnected_without_buffering() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| o.buffer_while_disconnected(false));

        socket.send(json!({"op": "lost"})).unwrap();
        assert_eq!(socket.pending_len(), 0);

        let connection = connect_and_accept(&socket, &transport);
        assert!(connection.sent().is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn null_values_are_not_sent() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| o);

        socket.send(Value::Null).unwrap();
        assert_eq!(socket.pending_len(), 0);
        assert!(socket.promise(Value::Null).unwrap().is_none());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn enveloper_can_veto_outbound_messages() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| o.enveloper(Filter));
        let connection = connect_and_accept(&socket, &transport);

        socket.send(json!({"private": true})).unwrap();
        socket.send(json!({"private": false})).unwrap();

        assert_eq!(connection.sent_text(), vec![r#"{"private":false}"#]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn encoders_chain_outbound() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| {
            o.encoder(JsonEncoder::wrapping(Versioned::new()))
        });
        let connection = connect_and_accept(&socket, &transport);

        socket.send(json!([1, 2])).unwrap();

        assert_eq!(connection.sent_text(), vec!["v1:[1,2]"]);
    })
    .await;
}

// ============================================================================
// Inbound
// ============================================================================

#[tokio::test(start_paused = true)]
async fn inbound_json_is_delivered_as_data() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        let connection = connect_and_accept(&socket, &transport);
        log.clear();

        connection.deliver(r#"{"price":101.5}"#).unwrap();
        connection.deliver(br#"[true]"#.to_vec()).unwrap();

        assert_eq!(
            log.events(),
            vec![
                SocketEvent::Message(Payload::Text(r#"{"price":101.5}"#.to_string())),
                SocketEvent::Data(json!({"price": 101.5})),
                SocketEvent::Message(Payload::Binary(b"[true]".to_vec())),
                SocketEvent::Data(json!([true])),
            ]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn decoders_chain_inbound_and_may_drop() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| {
            o.encoder(JsonEncoder::wrapping(Versioned::new()))
        });
        let connection = connect_and_accept(&socket, &transport);

        connection.deliver(r#"v1:{"ok":1}"#).unwrap();
        connection.deliver(r#"{"ok":2}"#).unwrap();

        assert_eq!(data_events(&log), vec![json!({"ok": 1})]);
        assert_eq!(log.count(EventKind::Message), 2);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn enveloper_can_hide_inbound_messages() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o.enveloper(Filter));
        let connection = connect_and_accept(&socket, &transport);

        connection.deliver(r#"{"type":"heartbeat"}"#).unwrap();
        connection.deliver(r#"{"type":"trade"}"#).unwrap();

        assert_eq!(data_events(&log), vec![json!({"type": "trade"})]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn id_enveloper_unwraps_unsolicited_messages() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| {
            o.enveloper(IdEnveloper::new().elevate(["topic"]))
        });
        let connection = connect_and_accept(&socket, &transport);

        connection
            .deliver(r#"{"id":"srv-1","topic":"news","data":{"headline":"hi"}}"#)
            .unwrap();

        assert_eq!(
            data_events(&log),
            vec![json!({"headline": "hi", "topic": "news"})]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn undecodable_input_is_reported_to_the_transport() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        let connection = connect_and_accept(&socket, &transport);

        let result = connection.deliver("not json");

        assert!(matches!(result, Err(Error::Decode(_))));
        assert!(matches!(
            connection.deliver(vec![0xff, 0x00]),
            Err(Error::Decode(_))
        ));
        assert_eq!(log.count(EventKind::Data), 0);
        assert_eq!(socket.state(), ConnectionState::Connected);
    })
    .await;
}
