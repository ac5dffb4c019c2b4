//! End-to-end engine tests over an in-memory wire pair.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;

use tether_client::{
    DispatchError, EventReceiver, Routes, Socket, SocketConfig, SocketEvent, SocketState,
};
use tether_protocol::messages::{ChatMessage, Ping, PresenceChange};
use tether_protocol::{Envelope, Routable, RouteKey, RouteRegistry};
use tether_transport::memory::{self, MemoryRemote};

fn connect(routes: Routes, config: SocketConfig) -> (Socket, EventReceiver, MemoryRemote) {
    let (sender, receiver, remote) = memory::pair();
    let (socket, events) =
        Socket::over(sender, receiver, routes, RouteRegistry::standard(), &config);
    (socket, events, remote)
}

async fn next_event(events: &mut EventReceiver) -> SocketEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn next_frame(remote: &mut MemoryRemote) -> String {
    timeout(Duration::from_secs(1), remote.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("wire closed")
}

#[tokio::test]
async fn frames_are_written_in_send_order() {
    let (socket, _events, mut remote) = connect(Routes::new(), SocketConfig::new("mem://"));

    for i in 0..20u64 {
        let id = socket
            .send(&ChatMessage {
                channel: "C1".to_string(),
                text: format!("frame-{i}"),
                ..ChatMessage::default()
            })
            .unwrap();
        assert_eq!(id, i + 1);
    }

    for i in 0..20u64 {
        let frame = next_frame(&mut remote).await;
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["id"], i + 1);
        assert_eq!(value["text"], format!("frame-{i}"));
    }
}

#[tokio::test]
async fn ping_frame_has_exact_wire_shape() {
    let (socket, _events, mut remote) = connect(Routes::new(), SocketConfig::new("mem://"));

    let id = socket.send(&Ping::default()).unwrap();
    assert_eq!(id, 1);
    assert_eq!(
        next_frame(&mut remote).await,
        r#"{"id":1,"ok":true,"type":"ping"}"#
    );
}

#[tokio::test]
async fn reply_callback_fires_at_most_once() {
    let (socket, mut events, mut remote) = connect(Routes::new(), SocketConfig::new("mem://"));
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

    let id = socket
        .send_with_reply::<_, Envelope, _>(&Ping::default(), move |reply| {
            reply_tx.send(reply).unwrap();
        })
        .unwrap();
    let _request = next_frame(&mut remote).await;

    remote.send(format!(r#"{{"reply_to":{id},"ok":true}}"#));
    let reply = timeout(Duration::from_secs(1), reply_rx.recv())
        .await
        .expect("reply callback never ran")
        .unwrap();
    assert_eq!(reply.reply_to, id);
    assert!(reply.ok);

    // The id was consumed: the same frame now matches nothing and routes
    // nowhere, so it surfaces as a handling error instead.
    remote.send(format!(r#"{{"reply_to":{id},"ok":true}}"#));
    match next_event(&mut events).await {
        SocketEvent::HandlingError(DispatchError::Untyped) => {}
        other => panic!("expected untyped handling error, got {other:?}"),
    }
    assert!(reply_rx.recv().await.is_none());
}

#[tokio::test]
async fn replies_correlate_by_id_not_arrival_order() {
    let (socket, _events, mut remote) = connect(Routes::new(), SocketConfig::new("mem://"));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tx_a = tx.clone();
    let first = socket
        .send_with_reply::<_, Envelope, _>(&Ping::default(), move |reply| {
            tx_a.send(("first", reply.reply_to)).unwrap();
        })
        .unwrap();
    let tx_b = tx;
    let second = socket
        .send_with_reply::<_, Envelope, _>(&Ping::default(), move |reply| {
            tx_b.send(("second", reply.reply_to)).unwrap();
        })
        .unwrap();
    next_frame(&mut remote).await;
    next_frame(&mut remote).await;

    // Answer out of order.
    remote.send(format!(r#"{{"reply_to":{second},"ok":true}}"#));
    remote.send(format!(r#"{{"reply_to":{first},"ok":true}}"#));

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(
            timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    seen.sort();
    assert_eq!(seen, vec![("first", first), ("second", second)]);
}

#[tokio::test]
async fn request_round_trips_through_its_own_bytes() {
    let (socket, _events, mut remote) = connect(Routes::new(), SocketConfig::new("mem://"));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let original = ChatMessage {
        channel: "C9".to_string(),
        text: "echo".to_string(),
        ..ChatMessage::default()
    };
    let id = socket
        .send_with_reply::<_, ChatMessage, _>(&original, move |reply| {
            tx.send(reply).unwrap();
        })
        .unwrap();

    // Feed the exact frame back as its own reply.
    let frame = next_frame(&mut remote).await;
    let mut value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    value["reply_to"] = serde_json::json!(id);
    remote.send(value.to_string());

    let reply = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, original);
}

#[tokio::test]
async fn multicast_runs_all_handlers_until_unbound() {
    let (socket, _events, remote) = connect(Routes::new(), SocketConfig::new("mem://"));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tx_a = tx.clone();
    let binding = socket.bind::<ChatMessage, _>(move |m| {
        tx_a.send(("first", m.text.clone())).unwrap();
    });
    let tx_b = tx;
    socket.bind::<ChatMessage, _>(move |m| {
        tx_b.send(("second", m.text.clone())).unwrap();
    });

    remote.send(r#"{"type":"message","channel":"C1","text":"one"}"#);
    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(
            timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(
        seen,
        vec![
            ("first", "one".to_string()),
            ("second", "one".to_string())
        ]
    );

    socket.unbind::<ChatMessage>(binding);
    remote.send(r#"{"type":"message","channel":"C1","text":"two"}"#);
    assert_eq!(
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap(),
        ("second", "two".to_string())
    );
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test]
async fn concurrent_close_emits_closed_exactly_once() {
    let (socket, mut events, _remote) = connect(Routes::new(), SocketConfig::new("mem://"));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let socket = socket.clone();
        tasks.push(tokio::spawn(async move { socket.close().await }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(matches!(next_event(&mut events).await, SocketEvent::Closed));
    assert!(
        timeout(Duration::from_millis(100), events.recv()).await.is_err(),
        "a second Closed event was emitted"
    );
    assert_eq!(socket.state(), SocketState::Closed);
}

#[tokio::test]
async fn unroutable_frame_raises_one_handling_error() {
    let (socket, mut events, mut remote) = connect(
        Routes::new().on::<ChatMessage, _>(|_| panic!("must not run")),
        SocketConfig::new("mem://"),
    );

    remote.send(r#"{"type":"mystery","subtype":"deep"}"#);
    match next_event(&mut events).await {
        SocketEvent::HandlingError(DispatchError::NoRoute { key }) => {
            assert_eq!(key, RouteKey::with_subtype("mystery", "deep"));
        }
        other => panic!("expected a no-route handling error, got {other:?}"),
    }

    // The dispatcher is still alive.
    socket.send(&Ping::default()).unwrap();
    assert!(remote.recv().await.is_some());
}

#[tokio::test]
async fn undecodable_frame_is_dropped_with_an_event() {
    let (_socket, mut events, remote) = connect(Routes::new(), SocketConfig::new("mem://"));

    remote.send("this is not json");
    assert!(matches!(
        next_event(&mut events).await,
        SocketEvent::DeserializationError(_)
    ));
}

#[tokio::test]
async fn payload_that_fails_schema_decode_raises_handling_error() {
    let (_socket, mut events, remote) = connect(
        Routes::new().on::<ChatMessage, _>(|_| panic!("must not run")),
        SocketConfig::new("mem://"),
    );

    // Valid envelope, but missing the schema's required fields.
    remote.send(r#"{"type":"message"}"#);
    assert!(matches!(
        next_event(&mut events).await,
        SocketEvent::HandlingError(DispatchError::Decode { .. })
    ));
}

#[tokio::test]
async fn handlers_bound_for_unregistered_types_still_dispatch() {
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Experimental {
        flag: String,
    }
    impl Routable for Experimental {
        fn route_keys() -> &'static [RouteKey] {
            const KEYS: &[RouteKey] = &[RouteKey::of("experimental_event")];
            KEYS
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (_socket, _events, remote) = connect(
        Routes::new().on::<Experimental, _>(move |m| {
            tx.send(m.flag.clone()).unwrap();
        }),
        SocketConfig::new("mem://"),
    );

    // "experimental_event" is not in the standard registry; the schema is
    // inferred from the bound handler.
    remote.send(r#"{"type":"experimental_event","flag":"on"}"#);
    assert_eq!(
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap(),
        "on"
    );
}

#[test]
fn socket_and_events_move_across_tasks() {
    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_send<T: Send>() {}
    assert_send_sync::<Socket>();
    assert_send::<EventReceiver>();
}

#[tokio::test]
async fn handler_bound_for_the_wrong_schema_raises_handling_error() {
    // Registers under "message", which the standard registry decodes as
    // ChatMessage; the downcast can never succeed.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct AuditRecord {
        actor: String,
    }
    impl Routable for AuditRecord {
        fn route_keys() -> &'static [RouteKey] {
            const KEYS: &[RouteKey] = &[RouteKey::of("message")];
            KEYS
        }
    }

    let (_socket, mut events, remote) = connect(
        Routes::new().on::<AuditRecord, _>(|_| panic!("must not run")),
        SocketConfig::new("mem://"),
    );

    remote.send(r#"{"type":"message","channel":"C1","text":"hi"}"#);
    match next_event(&mut events).await {
        SocketEvent::HandlingError(DispatchError::SchemaMismatch {
            key,
            handler_schema,
            payload_schema,
        }) => {
            assert_eq!(key, RouteKey::of("message"));
            assert!(handler_schema.ends_with("AuditRecord"));
            assert!(payload_schema.ends_with("ChatMessage"));
        }
        other => panic!("expected a schema mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn panicking_handler_raises_event_and_dispatcher_survives() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (_socket, mut events, remote) = connect(
        Routes::new().on::<ChatMessage, _>(move |m| {
            if m.text == "boom" {
                panic!("boom");
            }
            tx.send(m.text.clone()).unwrap();
        }),
        SocketConfig::new("mem://"),
    );

    remote.send(r#"{"type":"message","channel":"C1","text":"boom"}"#);
    match next_event(&mut events).await {
        SocketEvent::HandlingError(DispatchError::HandlerPanic { key }) => {
            assert_eq!(key, RouteKey::of("message"));
        }
        other => panic!("expected a handler panic event, got {other:?}"),
    }

    // Only that dispatch task died; later frames still reach the handler.
    remote.send(r#"{"type":"message","channel":"C1","text":"calm"}"#);
    assert_eq!(
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap(),
        "calm"
    );
}

#[tokio::test]
async fn multi_key_schema_receives_both_event_types() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (_socket, _events, remote) = connect(
        Routes::new().on::<PresenceChange, _>(move |p| {
            tx.send(p.presence.clone()).unwrap();
        }),
        SocketConfig::new("mem://"),
    );

    remote.send(r#"{"type":"presence_change","user":"U1","presence":"away"}"#);
    remote.send(r#"{"type":"manual_presence_change","user":"U1","presence":"active"}"#);

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(
            timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    seen.sort();
    assert_eq!(seen, vec!["active".to_string(), "away".to_string()]);
}

#[tokio::test]
async fn sends_after_close_are_discarded() {
    let (socket, _events, mut remote) = connect(Routes::new(), SocketConfig::new("mem://"));

    socket.close().await;
    assert_eq!(socket.state(), SocketState::Closed);
    assert!(!socket.is_open());

    // Queued but never written.
    socket.send(&Ping::default()).unwrap();
    assert!(timeout(Duration::from_millis(100), remote.recv()).await.is_err());
}

#[tokio::test]
async fn remote_close_surfaces_closed_event() {
    let (socket, mut events, remote) = connect(Routes::new(), SocketConfig::new("mem://"));

    remote.close();
    assert!(matches!(next_event(&mut events).await, SocketEvent::Closed));
    assert_eq!(socket.state(), SocketState::Closed);
}

#[tokio::test]
async fn unanswered_request_times_out_when_configured() {
    let config = SocketConfig::new("mem://").reply_timeout(Duration::from_millis(50));
    let (socket, mut events, mut remote) = connect(Routes::new(), config);

    let sent = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let saw_reply = Arc::clone(&sent);
    let id = socket
        .send_with_reply::<_, Envelope, _>(&Ping::default(), move |_| {
            saw_reply.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();
    next_frame(&mut remote).await;

    match next_event(&mut events).await {
        SocketEvent::HandlingError(DispatchError::ReplyTimedOut { id: timed_out, .. }) => {
            assert_eq!(timed_out, id);
        }
        other => panic!("expected a reply timeout, got {other:?}"),
    }

    // A late reply no longer reaches the callback.
    remote.send(format!(r#"{{"reply_to":{id},"ok":true}}"#));
    match next_event(&mut events).await {
        SocketEvent::HandlingError(DispatchError::Untyped) => {}
        other => panic!("expected untyped handling error, got {other:?}"),
    }
    assert!(!sent.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn requests_on_a_closed_socket_do_not_time_out() {
    let config = SocketConfig::new("mem://").reply_timeout(Duration::from_millis(50));
    let (socket, mut events, _remote) = connect(Routes::new(), config);

    socket.close().await;
    assert!(matches!(next_event(&mut events).await, SocketEvent::Closed));

    // The frame is discarded, so no reply is owed and no timeout fires.
    socket
        .send_with_reply::<_, Envelope, _>(&Ping::default(), |_| panic!("must not run"))
        .unwrap();
    assert!(
        timeout(Duration::from_millis(200), events.recv()).await.is_err(),
        "a request that was never written reported a timeout"
    );
}
