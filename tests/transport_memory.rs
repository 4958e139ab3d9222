// tests/transport_memory.rs

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use mom_session::{
    // ---
    create_memory_transport_with_hub,
    create_transport,
    events,
    global_hub,
    CorrelationId,
    MemoryHub,
    Session,
    SessionBuilder,
    SessionError,
    Transport,
    TransportConfig,
    TransportEvent,
};

fn config(host: &str) -> TransportConfig {
    TransportConfig {
        host: host.to_string(),
        transport_type: None,
        inbox_capacity: 8,
    }
}

#[tokio::test]
async fn emit_reaches_peer_and_peer_events_reach_inbox() {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let mut peer = hub.bind("memory://roundtrip").unwrap();
    let transport = create_memory_transport_with_hub(config("memory://roundtrip"), hub)
        .await
        .expect("failed to create memory transport");

    let mut inbox = transport.connect().await.expect("connect failed").inbox;
    assert!(peer.is_connected());

    // ---
    // Act
    // ---
    let call = json!({ "idm": 1, "params": { "obj": "o", "method": "m", "args": [] } });
    transport.emit(TransportEvent::call(call)).await.unwrap();
    peer.reply(CorrelationId::from(1), json!("pong")).await.unwrap();

    // ---
    // Assert
    // ---
    let seen = timeout(Duration::from_millis(100), peer.next_call())
        .await
        .expect("timed out waiting for call")
        .expect("peer channel closed unexpectedly");
    assert_eq!(seen.idm, CorrelationId::from(1));
    assert_eq!(peer.calls_emitted(), 1);

    let received = timeout(Duration::from_millis(100), inbox.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("inbox closed unexpectedly");
    assert_eq!(&*received.name, events::REPLY);
    assert_eq!(received.payload, json!({ "idm": 1, "result": "pong" }));
}

#[tokio::test]
async fn connect_twice_is_an_error() {
    // ---
    let hub = MemoryHub::new();
    let _peer = hub.bind("memory://twice").unwrap();
    let transport = create_memory_transport_with_hub(config("memory://twice"), hub)
        .await
        .unwrap();

    transport.connect().await.unwrap();
    assert!(matches!(
        transport.connect().await,
        Err(SessionError::Transport(_))
    ));
}

#[tokio::test]
async fn emit_before_connect_is_an_error() {
    // ---
    let hub = MemoryHub::new();
    let peer = hub.bind("memory://early").unwrap();
    let transport = create_memory_transport_with_hub(config("memory://early"), hub)
        .await
        .unwrap();

    let result = transport.emit(TransportEvent::call(json!({}))).await;
    assert!(matches!(result, Err(SessionError::Transport(_))));
    assert_eq!(peer.calls_emitted(), 0);
}

#[tokio::test]
async fn close_delivers_disconnect_once() {
    // ---
    let hub = MemoryHub::new();
    let peer = hub.bind("memory://close").unwrap();
    let transport = create_memory_transport_with_hub(config("memory://close"), hub)
        .await
        .unwrap();
    let mut inbox = transport.connect().await.unwrap().inbox;

    transport.close().await.unwrap();
    transport.close().await.unwrap();

    let event = inbox.recv().await.expect("expected a disconnect event");
    assert_eq!(&*event.name, events::DISCONNECT);
    assert!(inbox.recv().await.is_none());

    assert!(!peer.is_connected());
    assert!(transport.emit(TransportEvent::call(json!({}))).await.is_err());
    assert!(peer.reply(CorrelationId::from(1), json!(null)).await.is_err());
}

#[tokio::test]
async fn bind_twice_is_an_error() {
    // ---
    let hub = MemoryHub::new();
    let _peer = hub.bind("memory://busy").unwrap();
    assert!(matches!(
        hub.bind("memory://busy"),
        Err(SessionError::Transport(_))
    ));
}

#[tokio::test]
async fn unbound_host_is_refused() {
    // ---
    let hub = MemoryHub::new();
    let result = create_memory_transport_with_hub(config("memory://nobody"), hub).await;
    assert!(matches!(result, Err(SessionError::Transport(_))));
}

#[tokio::test]
async fn unknown_scheme_and_type_are_rejected() {
    // ---
    let result = create_transport(config("tcp://10.0.0.2:80")).await;
    assert!(matches!(result, Err(SessionError::Transport(_))));

    let mut typed = config("memory://anything");
    typed.transport_type = Some("carrier-pigeon".into());
    let result = create_transport(typed).await;
    assert!(matches!(result, Err(SessionError::Transport(_))));
}

#[tokio::test]
async fn builder_requires_host_or_transport() {
    // ---
    let result = SessionBuilder::new().build().await;
    assert!(matches!(result, Err(SessionError::MissingConfig(_))));
}

#[tokio::test]
async fn builder_takes_host_from_injected_transport() {
    // ---
    let hub = MemoryHub::new();
    let _peer = hub.bind("memory://injected").unwrap();
    let transport = create_memory_transport_with_hub(config("memory://injected"), hub)
        .await
        .unwrap();

    let session = SessionBuilder::new()
        .transport(transport)
        .request_timeout(Duration::from_millis(10))
        .build()
        .await
        .unwrap();

    assert_eq!(session.host(), "memory://injected");
    let result = session.call_function("o", "m", vec![]).await;
    assert!(matches!(result, Err(SessionError::Timeout { .. })));
}

#[tokio::test]
async fn open_resolves_memory_hosts_through_global_hub() {
    // ---
    common::init_logging();

    let host = "memory://global-open";
    let mut peer = global_hub().bind(host).unwrap();
    let session = Session::open(host).await.unwrap();

    let (reply, ()) = tokio::join!(session.call_function("o", "ping", vec![]), async {
        let call = common::expect_call(&mut peer).await;
        peer.reply(call.idm, json!("pong")).await.unwrap();
    });
    assert_eq!(reply.unwrap()["result"], json!("pong"));

    session.dispose().await.unwrap();
}
