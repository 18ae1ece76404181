//! Connection lifecycle: connecting, losing the transport, reconnecting and
//! stopping.

mod common;

use common::*;
use rustsock::prelude::*;
use rustsock::transport::memory::MemoryTransport;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::sleep;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

// ============================================================================
// Connecting
// ============================================================================

#[tokio::test(start_paused = true)]
async fn new_socket_is_idle_and_stopped() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);

        assert_eq!(socket.state(), ConnectionState::Idle);
        assert!(socket.stopped());
        assert_eq!(socket.attempts(), 0);
        assert_eq!(transport.open_count(), 0);
        assert!(log.events().is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn connect_opens_a_single_handle() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);

        socket.connect().unwrap();
        socket.connect().unwrap();
        assert_eq!(transport.open_count(), 1);
        assert_eq!(socket.state(), ConnectionState::Connecting);
        assert!(!socket.stopped());

        let connection = transport.last_connection().unwrap();
        assert_eq!(connection.endpoint(), "ws://test.local/ws");
        connection.accept().unwrap();

        assert_eq!(socket.state(), ConnectionState::Connected);
        assert_eq!(log.kinds(), vec![EventKind::Open, EventKind::Connect]);

        socket.connect().unwrap();
        assert_eq!(transport.open_count(), 1);
    })
    .await;
}

// ============================================================================
// Losing The Transport
// ============================================================================

#[tokio::test(start_paused = true)]
async fn remote_close_schedules_a_reconnect() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        let first = connect_and_accept(&socket, &transport);
        log.clear();

        first.hang_up().unwrap();

        assert_eq!(
            log.events(),
            vec![
                SocketEvent::Close,
                SocketEvent::Disconnect { was_open: true },
                SocketEvent::Scheduled(ms(1000)),
            ]
        );
        assert_eq!(socket.state(), ConnectionState::Scheduled);
        assert_eq!(socket.attempts(), 1);
        assert!(!first.is_attached());

        sleep(ms(999)).await;
        assert_eq!(transport.open_count(), 1);

        sleep(ms(2)).await;
        assert_eq!(transport.open_count(), 2);
        assert_eq!(socket.state(), ConnectionState::Connecting);

        transport.last_connection().unwrap().accept().unwrap();
        assert_eq!(socket.state(), ConnectionState::Connected);
        assert_eq!(socket.attempts(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn error_followed_by_close_is_one_disconnect() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        let connection = connect_and_accept(&socket, &transport);
        log.clear();

        connection.fail("connection reset").unwrap();

        assert_eq!(
            log.events(),
            vec![
                SocketEvent::Error("connection reset".to_string()),
                SocketEvent::Disconnect { was_open: true },
                SocketEvent::Scheduled(ms(1000)),
            ]
        );
        assert_eq!(socket.attempts(), 1);

        sleep(ms(1001)).await;
        assert_eq!(transport.open_count(), 2);
        assert_eq!(log.count(EventKind::Disconnect), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn bare_error_is_treated_as_a_loss() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        let connection = connect_and_accept(&socket, &transport);
        log.clear();

        connection.error("protocol violation").unwrap();

        assert_eq!(log.count(EventKind::Disconnect), 1);
        assert_eq!(log.count(EventKind::Close), 0);
        assert_eq!(socket.state(), ConnectionState::Scheduled);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn failure_before_open_reports_a_never_opened_handle() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);

        socket.connect().unwrap();
        transport.last_connection().unwrap().hang_up().unwrap();

        assert_eq!(
            log.events(),
            vec![
                SocketEvent::Close,
                SocketEvent::Disconnect { was_open: false },
                SocketEvent::Scheduled(ms(1000)),
            ]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn refused_open_is_treated_as_a_lost_handle() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        transport.refuse(Some("network unreachable"));

        socket.connect().unwrap();

        assert_eq!(
            log.events(),
            vec![
                SocketEvent::Disconnect { was_open: false },
                SocketEvent::Scheduled(ms(1000)),
            ]
        );
        assert_eq!(socket.state(), ConnectionState::Scheduled);

        transport.refuse(None);
        sleep(ms(1001)).await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(socket.state(), ConnectionState::Connecting);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn signals_from_a_replaced_handle_are_ignored() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        let first = connect_and_accept(&socket, &transport);

        first.hang_up().unwrap();
        sleep(ms(1001)).await;
        let second = transport.last_connection().unwrap();
        second.accept().unwrap();
        log.clear();

        first.deliver(r#"{"stale":true}"#).unwrap();
        first.fail("late failure").unwrap();

        assert!(log.events().is_empty());
        assert!(second.is_attached());
        assert_eq!(socket.state(), ConnectionState::Connected);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn auto_reconnect_can_be_disabled() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o.auto_reconnect(false));
        let connection = connect_and_accept(&socket, &transport);

        connection.hang_up().unwrap();

        assert_eq!(log.count(EventKind::Disconnect), 1);
        assert_eq!(log.count(EventKind::Scheduled), 0);
        assert_eq!(socket.state(), ConnectionState::Idle);
        assert!(!socket.stopped());

        sleep(ms(10_000)).await;
        assert_eq!(transport.open_count(), 1);
    })
    .await;
}

// ============================================================================
// Retry Policy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn attempts_climb_until_an_open_resets_them() {
    local(async {
        let transport = MemoryTransport::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let recorded = seen.clone();
        let (socket, _log) = socket_with(&transport, move |o| {
            o.retry_provider(move |attempt: u32| {
                recorded.borrow_mut().push(attempt);
                10
            })
        });

        socket.connect().unwrap();
        transport.last_connection().unwrap().hang_up().unwrap();
        assert_eq!(socket.attempts(), 1);

        sleep(ms(11)).await;
        transport.last_connection().unwrap().hang_up().unwrap();
        assert_eq!(socket.attempts(), 2);

        sleep(ms(11)).await;
        transport.last_connection().unwrap().accept().unwrap();

        assert_eq!(socket.attempts(), 0);
        assert_eq!(*seen.borrow(), vec![1, 2, 0]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn endpoints_rotate_on_failure_and_reset_on_open() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| {
            o.uri_provider(RotatingEndpoints::new(["ws://a", "ws://b"]))
                .retry_provider(FixedDelay(ms(5)))
        });

        socket.connect().unwrap();
        transport.last_connection().unwrap().hang_up().unwrap();
        sleep(ms(6)).await;
        transport.last_connection().unwrap().hang_up().unwrap();
        sleep(ms(6)).await;
        transport.last_connection().unwrap().accept().unwrap();
        transport.last_connection().unwrap().hang_up().unwrap();
        sleep(ms(6)).await;

        let endpoints: Vec<String> = transport
            .connections()
            .iter()
            .map(|c| c.endpoint())
            .collect();
        assert_eq!(endpoints, vec!["ws://a", "ws://b", "ws://a", "ws://b"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn step_backoff_grows_the_delay() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| {
            o.retry_provider(StepBackoff::new([ms(100), ms(300)]))
        });

        socket.connect().unwrap();
        for wait in [100, 300, 300] {
            transport.last_connection().unwrap().hang_up().unwrap();
            sleep(ms(wait + 1)).await;
        }

        let delays: Vec<Duration> = log
            .events()
            .into_iter()
            .filter_map(|event| match event {
                SocketEvent::Scheduled(delay) => Some(delay),
                _ => None,
            })
            .collect();
        assert_eq!(delays, vec![ms(100), ms(300), ms(300)]);
        assert_eq!(transport.open_count(), 4);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn negative_delays_reconnect_immediately() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o.retry_provider(|_: u32| -250));

        socket.connect().unwrap();
        transport.last_connection().unwrap().hang_up().unwrap();
        assert!(log.events().contains(&SocketEvent::Scheduled(Duration::ZERO)));

        sleep(ms(1)).await;
        assert_eq!(transport.open_count(), 2);
    })
    .await;
}

// ============================================================================
// Stopping
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stop_closes_without_reconnecting() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        let connection = connect_and_accept(&socket, &transport);
        log.clear();

        socket.stop().unwrap();

        assert!(connection.is_closed());
        assert!(socket.stopped());
        assert_eq!(socket.state(), ConnectionState::Idle);
        assert_eq!(
            log.events(),
            vec![SocketEvent::Close, SocketEvent::Disconnect { was_open: true }]
        );

        sleep(ms(10_000)).await;
        assert_eq!(transport.open_count(), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_a_pending_reconnect() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        connect_and_accept(&socket, &transport).hang_up().unwrap();
        assert_eq!(socket.state(), ConnectionState::Scheduled);
        log.clear();

        socket.stop().unwrap();

        assert_eq!(socket.state(), ConnectionState::Idle);
        assert!(log.events().is_empty());

        sleep(ms(10_000)).await;
        assert_eq!(transport.open_count(), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn stop_while_connecting_closes_once_open() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);

        socket.connect().unwrap();
        socket.stop().unwrap();
        assert_eq!(socket.state(), ConnectionState::Connecting);

        let connection = transport.last_connection().unwrap();
        connection.accept().unwrap();

        assert!(connection.is_closed());
        assert_eq!(socket.state(), ConnectionState::Idle);
        assert_eq!(
            log.events(),
            vec![
                SocketEvent::Open,
                SocketEvent::Close,
                SocketEvent::Disconnect { was_open: true },
            ]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn connect_after_stop_starts_over() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, _log) = socket_with(&transport, |o| o);
        connect_and_accept(&socket, &transport);
        socket.stop().unwrap();

        let connection = connect_and_accept(&socket, &transport);

        assert_eq!(transport.open_count(), 2);
        assert!(connection.is_open());
        assert_eq!(socket.state(), ConnectionState::Connected);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn handlers_may_call_back_into_the_socket() {
    local(async {
        let transport = MemoryTransport::new();
        let (socket, log) = socket_with(&transport, |o| o);
        let weak = socket.downgrade();
        socket
            .on(EventKind::Disconnect, move |_| {
                if let Some(socket) = weak.upgrade() {
                    socket.stop().unwrap();
                }
            })
            .unwrap();

        connect_and_accept(&socket, &transport).hang_up().unwrap();

        assert_eq!(log.count(EventKind::Scheduled), 0);
        assert_eq!(socket.state(), ConnectionState::Idle);
        assert!(socket.stopped());
    })
    .await;
}
