use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use objects::{ClassName, SecretStore, StoreError, TransportFailure, INSTALLATION_ID_KEY};

use super::*;
use crate::test_support::{client, config, Attempt, MemoryConnector, ServerEnd};

fn messages() -> LiveQuery {
    LiveQuery::all(ClassName::new("Message").unwrap())
}

async fn wait_for(client: &LiveQueryClient, state: ConnectionState) {
    client
        .watch_state()
        .wait_for(|s| *s == state)
        .await
        .unwrap();
}

/// Opens `client`, completes the handshake, and returns the server end.
async fn connected(
    client: &LiveQueryClient,
    accepted: &mut mpsc::UnboundedReceiver<ServerEnd>,
) -> ServerEnd {
    client.open().await.unwrap();
    let mut server = accepted.recv().await.unwrap();
    assert_eq!(server.next_frame().await["op"], "connect");
    server.send_json(json!({"op": "connected", "clientId": "c1"}));
    wait_for(client, ConnectionState::Connected).await;
    server
}

// ---------------------------------------------------------------------------
// Handshake and subscriptions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_subscriptions_are_sent_once_connected() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut subscription = client.subscribe(messages()).unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.open().await.unwrap();
    assert_eq!(client.state(), ConnectionState::SocketEstablished);
    let mut server = accepted.recv().await.unwrap();

    let connect = server.next_frame().await;
    assert_eq!(connect["op"], "connect");
    assert_eq!(connect["applicationId"], "app");
    assert_eq!(connect["clientKey"], "client");
    server.send_json(json!({"op": "connected", "clientId": "c1"}));

    let subscribe = server.next_frame().await;
    assert_eq!(subscribe["op"], "subscribe");
    assert_eq!(subscribe["requestId"], subscription.id().as_u64());
    assert_eq!(subscribe["query"]["className"], "Message");
    assert_eq!(client.state(), ConnectionState::Connected);

    server.send_json(json!({"op": "subscribed", "requestId": subscription.id()}));
    assert_eq!(
        subscription.next_event().await,
        Some(SubscriptionEvent::Subscribed)
    );
}

#[tokio::test]
async fn request_ids_increase_from_one() {
    let (connector, _accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let first = client.subscribe(messages()).unwrap();
    let second = client.subscribe(messages()).unwrap();
    assert_eq!(first.id(), RequestId::new(1));
    assert_eq!(second.id(), RequestId::new(2));
}

#[tokio::test]
async fn connect_frame_carries_the_cached_installation_id() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, secrets) = client(&config(), &connector);
    let cached = secrets.get(INSTALLATION_ID_KEY).unwrap();
    assert_eq!(client.installation_id().to_string(), cached);

    client.open().await.unwrap();
    let mut server = accepted.recv().await.unwrap();
    assert_eq!(server.next_frame().await["installationId"], cached);
}

#[tokio::test]
async fn open_is_a_no_op_once_established() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let _server = connected(&client, &mut accepted).await;

    client.open().await.unwrap();

    assert_eq!(connector.urls().len(), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn events_reach_their_subscription_and_unknown_ids_are_dropped() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;
    let mut subscription = client.subscribe(messages()).unwrap();
    assert_eq!(server.next_frame().await["op"], "subscribe");

    server.send_json(json!({
        "op": "create",
        "requestId": 99,
        "object": {"className": "Message", "objectId": "ghost"}
    }));
    server.send_json(json!({
        "op": "update",
        "requestId": subscription.id(),
        "object": {"className": "Message", "objectId": "m1", "text": "hi"}
    }));

    match subscription.next_event().await {
        Some(SubscriptionEvent::Event { kind, object }) => {
            assert_eq!(kind, EventKind::Update);
            assert_eq!(object.object_id().unwrap().as_str(), "m1");
        }
        other => panic!("expected an update event, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn undecodable_payloads_are_errors_for_that_subscription() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;
    let mut subscription = client.subscribe(messages()).unwrap();
    server.next_frame().await;

    server.send_json(json!({"op": "enter", "requestId": subscription.id(), "object": 7}));

    assert!(matches!(
        subscription.next_event().await,
        Some(SubscriptionEvent::Error(StoreError::Protocol { .. }))
    ));
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn error_frames_with_a_request_id_stay_with_that_subscription() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;
    let mut failing = client.subscribe(messages()).unwrap();
    let mut healthy = client.subscribe(messages()).unwrap();
    server.next_frame().await;
    server.next_frame().await;

    server.send_json(json!({
        "op": "error",
        "requestId": failing.id(),
        "code": 101,
        "error": "bad query",
        "reconnect": false
    }));
    server.send_json(json!({"op": "subscribed", "requestId": healthy.id()}));

    assert_eq!(
        failing.next_event().await,
        Some(SubscriptionEvent::Error(StoreError::Server {
            code: 101,
            message: "bad query".into()
        }))
    );
    assert_eq!(healthy.next_event().await, Some(SubscriptionEvent::Subscribed));
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn update_and_unsubscribe_send_frames() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;
    let mut subscription = client.subscribe(messages()).unwrap();
    server.next_frame().await;

    client
        .update(subscription.id(), messages().matching(json!({"room": "b"})))
        .unwrap();
    let update = server.next_frame().await;
    assert_eq!(update["op"], "update");
    assert_eq!(update["query"]["where"]["room"], "b");

    client.unsubscribe(subscription.id());
    let unsubscribe = server.next_frame().await;
    assert_eq!(unsubscribe["op"], "unsubscribe");
    assert_eq!(unsubscribe["requestId"], subscription.id().as_u64());
    assert_eq!(subscription.next_event().await, None);

    // Unknown ids are ignored.
    client.unsubscribe(RequestId::new(42));
}

#[tokio::test]
async fn callback_subscriptions_receive_events() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let id = client
        .subscribe_with(messages(), move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
    server.next_frame().await;
    server.send_json(json!({"op": "subscribed", "requestId": id}));

    assert_eq!(rx.recv().await, Some(SubscriptionEvent::Subscribed));
}

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_before_the_socket_exists_fails_without_state_change() {
    let (connector, _accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut changes = client.watch_state();

    let err = client.send_ping().await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::Connection {
            failure: TransportFailure::Connect,
            ..
        }
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!changes.has_changed().unwrap());
    assert!(connector.urls().is_empty());
}

#[tokio::test]
async fn ping_resolves_on_the_matching_pong() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;

    let pinger = client.clone();
    let ping = tokio::spawn(async move { pinger.send_ping().await });
    let SocketMessage::Ping(payload) = server.recv().await else {
        panic!("expected a ping");
    };
    server.send(SocketMessage::Pong(vec![0xde, 0xad]));
    server.send(SocketMessage::Pong(payload));

    ping.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn unanswered_ping_times_out_without_dropping_the_socket() {
    let mut cfg = config();
    cfg.live.ping_timeout_ms = 500;
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&cfg, &connector);
    let mut server = connected(&client, &mut accepted).await;

    let pinger = client.clone();
    let ping = tokio::spawn(async move { pinger.send_ping().await });
    assert!(matches!(server.recv().await, SocketMessage::Ping(_)));

    assert_eq!(
        ping.await.unwrap(),
        Err(StoreError::Timeout {
            operation: "ping".into()
        })
    );
    assert_eq!(client.state(), ConnectionState::Connected);
}

// ---------------------------------------------------------------------------
// Close and shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_fails_pending_pings_and_is_idempotent() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;

    let pinger = client.clone();
    let ping = tokio::spawn(async move { pinger.send_ping().await });
    assert!(matches!(server.recv().await, SocketMessage::Ping(_)));

    client.close().await;
    assert_eq!(ping.await.unwrap(), Err(StoreError::Closed));
    assert_eq!(server.recv().await, SocketMessage::Close);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn subscriptions_survive_close_and_reopen() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;
    let subscription = client.subscribe(messages()).unwrap();
    server.next_frame().await;

    client.close().await;
    let mut server = connected(&client, &mut accepted).await;

    let resent = server.next_frame().await;
    assert_eq!(resent["op"], "subscribe");
    assert_eq!(resent["requestId"], subscription.id().as_u64());
}

#[tokio::test]
async fn dropped_subscriptions_unsubscribe_and_are_not_resent() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;
    let dropped = client.subscribe(messages()).unwrap();
    let kept = client.subscribe(messages()).unwrap();
    server.next_frame().await;
    server.next_frame().await;
    let dropped_id = dropped.id();

    drop(dropped);
    let unsubscribe = server.next_frame().await;
    assert_eq!(unsubscribe["op"], "unsubscribe");
    assert_eq!(unsubscribe["requestId"], dropped_id.as_u64());

    client.close().await;
    let mut server = connected(&client, &mut accepted).await;

    let resent = server.next_frame().await;
    assert_eq!(resent["op"], "subscribe");
    assert_eq!(resent["requestId"], kept.id().as_u64());

    // Nothing else was re-sent: the next message is the ping.
    let pinger = client.clone();
    let ping = tokio::spawn(async move { pinger.send_ping().await });
    let SocketMessage::Ping(payload) = server.recv().await else {
        panic!("expected a ping");
    };
    server.send(SocketMessage::Pong(payload));
    ping.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_ends_streams_and_rejects_later_calls() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let _server = connected(&client, &mut accepted).await;
    let mut subscription = client.subscribe(messages()).unwrap();

    client.shutdown().await;

    assert_eq!(subscription.next_event().await, None);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(client.subscribe(messages()), Err(StoreError::Closed)));
    assert_eq!(client.open().await, Err(StoreError::Closed));
    assert_eq!(client.send_ping().await, Err(StoreError::Closed));
    client.close().await;
}

// ---------------------------------------------------------------------------
// Reconnection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn server_drop_reconnects_and_resubscribes() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let mut server = connected(&client, &mut accepted).await;
    let subscription = client.subscribe(messages()).unwrap();
    server.next_frame().await;

    drop(server);

    let mut server = accepted.recv().await.unwrap();
    assert_eq!(server.next_frame().await["op"], "connect");
    server.send_json(json!({"op": "connected", "clientId": "c2"}));
    let resent = server.next_frame().await;
    assert_eq!(resent["op"], "subscribe");
    assert_eq!(resent["requestId"], subscription.id().as_u64());
    assert_eq!(connector.urls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unanswered_keep_alive_counts_as_a_disconnect() {
    let mut cfg = config();
    cfg.live.ping_interval_ms = 1_000;
    cfg.live.ping_timeout_ms = 500;
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&cfg, &connector);
    let mut server = connected(&client, &mut accepted).await;
    let started = tokio::time::Instant::now();

    assert!(matches!(server.recv().await, SocketMessage::Ping(_)));
    assert!(started.elapsed() >= Duration::from_millis(1_000));

    let mut replacement = accepted.recv().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(1_500));
    assert_eq!(replacement.next_frame().await["op"], "connect");
}

#[tokio::test(start_paused = true)]
async fn answered_keep_alives_keep_the_socket() {
    let mut cfg = config();
    cfg.live.ping_interval_ms = 1_000;
    cfg.live.ping_timeout_ms = 500;
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&cfg, &connector);
    let mut server = connected(&client, &mut accepted).await;

    for _ in 0..3 {
        let SocketMessage::Ping(payload) = server.recv().await else {
            panic!("expected a keep-alive ping");
        };
        server.send(SocketMessage::Pong(payload));
    }

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(connector.urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn refused_open_without_auto_reconnect_stays_disconnected() {
    let mut cfg = config();
    cfg.live.auto_reconnect = false;
    let (connector, _accepted) = MemoryConnector::new();
    connector.refuse_next();
    let (client, _) = client(&cfg, &connector);

    let err = client.open().await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::Connection {
            failure: TransportFailure::Connect,
            ..
        }
    ));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(connector.urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn refused_open_with_auto_reconnect_retries() {
    let (connector, mut accepted) = MemoryConnector::new();
    connector.refuse_next();
    connector.refuse_next();
    let (client, _) = client(&config(), &connector);

    assert!(client.open().await.is_err());

    let mut server = accepted.recv().await.unwrap();
    assert_eq!(server.next_frame().await["op"], "connect");
    assert_eq!(connector.urls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn connect_deadline_is_a_timeout() {
    let mut cfg = config();
    cfg.live.connect_timeout_ms = 1_000;
    cfg.live.auto_reconnect = false;
    let (connector, _accepted) = MemoryConnector::new();
    connector.push(Attempt::Stall);
    let (client, _) = client(&cfg, &connector);

    assert_eq!(
        client.open().await,
        Err(StoreError::Timeout {
            operation: "connect".into()
        })
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn close_during_connect_fails_the_open() {
    let (connector, _accepted) = MemoryConnector::new();
    connector.push(Attempt::Stall);
    let (client, _) = client(&config(), &connector);

    let opener = client.clone();
    let open = tokio::spawn(async move { opener.open().await });
    wait_for(&client, ConnectionState::Connecting).await;
    client.close().await;

    assert_eq!(open.await.unwrap(), Err(StoreError::Closed));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn fatal_error_frame_disconnects_without_reconnecting() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let server = connected(&client, &mut accepted).await;

    server.send_json(json!({"op": "error", "code": 4, "error": "bad key", "reconnect": false}));
    wait_for(&client, ConnectionState::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert!(accepted.try_recv().is_err());
    assert_eq!(connector.urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn recoverable_error_frame_reconnects() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let server = connected(&client, &mut accepted).await;

    server.send_json(json!({"op": "error", "code": 1, "error": "restart", "reconnect": true}));

    let mut replacement = accepted.recv().await.unwrap();
    assert_eq!(replacement.next_frame().await["op"], "connect");
}

#[tokio::test]
async fn redirect_moves_to_the_new_url() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let server = connected(&client, &mut accepted).await;

    server.send_json(json!({"op": "redirect", "url": "wss://other.example.com/live"}));

    let mut replacement = accepted.recv().await.unwrap();
    assert_eq!(replacement.next_frame().await["op"], "connect");
    let urls = connector.urls();
    assert_eq!(urls[0].as_str(), "wss://example.com/store");
    assert_eq!(urls[1].as_str(), "wss://other.example.com/live");
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_drop_the_connection() {
    let (connector, mut accepted) = MemoryConnector::new();
    let (client, _) = client(&config(), &connector);
    let server = connected(&client, &mut accepted).await;

    server.send(SocketMessage::Text("{\"op\":\"teleport\"}".into()));

    let mut replacement = accepted.recv().await.unwrap();
    assert_eq!(replacement.next_frame().await["op"], "connect");
}
