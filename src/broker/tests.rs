use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use super::{Ack, BrokerClient, ConnectionState, Dispatch, ReceiveStats, SubscriptionRegistry};
use crate::test_support::{TestSocket, next_frame, send_frame, ws_pair};
use crate::transport::{Frame, Verb};
use crate::utils::BridgeError;
use crate::utils::queue::{Offer, Overflow, QueuePolicy};
use crate::utils::shutdown;

fn message_for(subscription: &str, body: &str) -> Frame {
    Frame::new(Verb::Message)
        .with_header("subscription", subscription)
        .with_header("destination", "/topic/test")
        .with_body(body)
}

async fn connected_client() -> (Arc<BrokerClient<tokio::io::DuplexStream>>, super::Inbound<tokio::io::DuplexStream>, TestSocket) {
    let (client_ws, mut server) = ws_pair().await;
    let (client, inbound) = BrokerClient::new(client_ws, QueuePolicy::default(), "1.0,1.1,2.0");
    client.connect().await.unwrap();
    let connect = next_frame(&mut server).await;
    assert_eq!(connect.verb(), Verb::Connect);
    (Arc::new(client), inbound, server)
}

#[tokio::test]
async fn test_registry_dispatch_reaches_only_target() {
    let registry = SubscriptionRegistry::new(QueuePolicy::default());
    let (first, mut first_rx) = registry.register("/topic/a").await;
    let (_second, mut second_rx) = registry.register("/topic/b").await;

    let outcome = registry
        .dispatch(&first.to_string(), message_for(&first.to_string(), "one"))
        .await
        .unwrap();

    assert_eq!(outcome, Dispatch::Delivered);
    assert_eq!(first_rx.recv().await.unwrap().body(), b"one");
    assert!(first_rx.try_recv().is_err());
    assert!(second_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_registry_unknown_and_malformed_ids() {
    let registry = SubscriptionRegistry::new(QueuePolicy::default());
    let (_id, mut rx) = registry.register("/topic/a").await;

    let unknown = Uuid::new_v4().to_string();
    let outcome = registry
        .dispatch(&unknown, message_for(&unknown, "x"))
        .await
        .unwrap();
    assert_eq!(outcome, Dispatch::NoSubscriber);

    let err = registry
        .dispatch("not-a-uuid", message_for("not-a-uuid", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidSubscriptionId { .. }));

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_registry_unregister_closes_queue() {
    let registry = SubscriptionRegistry::new(QueuePolicy::default());
    let (id, mut rx) = registry.register("/topic/a").await;
    registry
        .dispatch(&id.to_string(), message_for(&id.to_string(), "last"))
        .await
        .unwrap();

    assert!(registry.unregister(id).await);
    assert!(!registry.unregister(id).await);
    assert!(registry.is_empty().await);

    assert_eq!(rx.recv().await.unwrap().body(), b"last");
    assert!(rx.recv().await.is_none());

    let outcome = registry
        .dispatch(&id.to_string(), message_for(&id.to_string(), "late"))
        .await
        .unwrap();
    assert_eq!(outcome, Dispatch::NoSubscriber);
}

#[tokio::test]
async fn test_registry_applies_overflow_policy() {
    let registry = SubscriptionRegistry::new(QueuePolicy::new(1, Overflow::DropNewest));
    let (id, _rx) = registry.register("/topic/a").await;
    let key = id.to_string();

    assert_eq!(
        registry.dispatch(&key, message_for(&key, "1")).await.unwrap(),
        Dispatch::Delivered
    );
    assert_eq!(
        registry.dispatch(&key, message_for(&key, "2")).await.unwrap(),
        Dispatch::Dropped(Offer::Full)
    );
}

#[tokio::test]
async fn test_registry_lists_live_ids() {
    let registry = SubscriptionRegistry::new(QueuePolicy::default());
    let (first, _first_rx) = registry.register("/topic/a").await;
    let (second, _second_rx) = registry.register("/topic/b").await;

    let mut ids = registry.ids().await;
    ids.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(ids, expected);

    registry.unregister(first).await;
    assert_eq!(registry.ids().await, vec![second]);
}

#[tokio::test]
async fn test_connect_sends_accept_version() {
    let (client_ws, mut server) = ws_pair().await;
    let (client, _inbound) = BrokerClient::new(client_ws, QueuePolicy::default(), "1.0,1.1,2.0");
    assert_eq!(client.state(), ConnectionState::Connecting);

    client.connect().await.unwrap();

    let frame = next_frame(&mut server).await;
    assert_eq!(frame.verb(), Verb::Connect);
    assert_eq!(frame.header("accept-version"), Some("1.0,1.1,2.0"));
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_operations_require_connection() {
    let (client_ws, _server) = ws_pair().await;
    let (client, _inbound) = BrokerClient::new(client_ws, QueuePolicy::default(), "1.2");

    let err = client.subscribe("/topic/sensor", Ack::Auto).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::NotConnected(ConnectionState::Connecting)
    ));
    assert!(client.send("/topic/response", b"x", "", None).await.is_err());
}

#[tokio::test]
async fn test_subscribe_and_route_message() {
    let (client, inbound, mut server) = connected_client().await;
    let (_trigger, signal) = shutdown::channel();
    let receiver = {
        let client = client.clone();
        tokio::spawn(async move { client.receive_loop(inbound, signal).await })
    };

    let mut motor = client
        .subscribe("/topic/motor-control", Ack::Auto)
        .await
        .unwrap();
    let mut sensor = client.subscribe("/topic/sensor", Ack::Client).await.unwrap();

    let frame = next_frame(&mut server).await;
    assert_eq!(frame.verb(), Verb::Subscribe);
    assert_eq!(frame.header("id"), Some(motor.id().to_string().as_str()));
    assert_eq!(frame.header("destination"), Some("/topic/motor-control"));
    assert_eq!(frame.header("ack"), Some("auto"));
    let frame = next_frame(&mut server).await;
    assert_eq!(frame.header("ack"), Some("client"));

    send_frame(&mut server, &message_for(&motor.id().to_string(), "forward")).await;

    let delivered = tokio::time::timeout(Duration::from_secs(2), motor.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.body(), b"forward");
    assert!(
        tokio::time::timeout(Duration::from_millis(50), sensor.recv())
            .await
            .is_err()
    );

    receiver.abort();
}

#[tokio::test]
async fn test_messages_keep_broker_order() {
    let (client, inbound, mut server) = connected_client().await;
    let (_trigger, signal) = shutdown::channel();
    let receiver = {
        let client = client.clone();
        tokio::spawn(async move { client.receive_loop(inbound, signal).await })
    };
    let mut sub = client.subscribe("/topic/turn-out", Ack::Auto).await.unwrap();
    next_frame(&mut server).await;

    for n in 0..10 {
        send_frame(&mut server, &message_for(&sub.id().to_string(), &n.to_string())).await;
    }
    for n in 0..10 {
        let frame = sub.recv().await.unwrap();
        assert_eq!(frame.body(), n.to_string().as_bytes());
    }

    receiver.abort();
}

#[tokio::test]
async fn test_send_frame_headers() {
    let (client, _inbound, mut server) = connected_client().await;

    client
        .send("/topic/response", br#"{"cmd":1}"#, "", None)
        .await
        .unwrap();
    let frame = next_frame(&mut server).await;
    assert_eq!(frame.verb(), Verb::Send);
    assert_eq!(frame.header("destination"), Some("/topic/response"));
    assert_eq!(frame.header("content-type"), Some("text/plain"));
    assert_eq!(frame.header("transaction"), None);
    assert_eq!(frame.body(), br#"{"cmd":1}"#);

    client
        .send("/topic/response", b"{}", "application/json", Some("tx-1"))
        .await
        .unwrap();
    let frame = next_frame(&mut server).await;
    assert_eq!(frame.header("content-type"), Some("application/json"));
    assert_eq!(frame.header("transaction"), Some("tx-1"));

    client
        .send("/topic/response", b"{}", "application/json", Some(""))
        .await
        .unwrap();
    let frame = next_frame(&mut server).await;
    assert_eq!(frame.header("transaction"), None);
}

#[tokio::test]
async fn test_unsubscribe_closes_subscription() {
    let (client, _inbound, mut server) = connected_client().await;
    let mut sub = client.subscribe("/topic/sensor", Ack::Auto).await.unwrap();
    next_frame(&mut server).await;

    client.unsubscribe(sub.id()).await.unwrap();

    let frame = next_frame(&mut server).await;
    assert_eq!(frame.verb(), Verb::Unsubscribe);
    assert_eq!(frame.header("id"), Some(sub.id().to_string().as_str()));
    assert!(sub.recv().await.is_none());
    assert!(client.subscriptions().is_empty().await);
}

#[tokio::test]
async fn test_subscribe_rolls_back_on_write_failure() {
    let (client, _inbound, server) = connected_client().await;
    drop(server);

    assert!(client.subscribe("/topic/sensor", Ack::Auto).await.is_err());
    assert!(client.subscriptions().is_empty().await);
}

#[tokio::test]
async fn test_unsubscribe_removes_entry_when_write_fails() {
    let (client, _inbound, mut server) = connected_client().await;
    let sub = client.subscribe("/topic/sensor", Ack::Auto).await.unwrap();
    next_frame(&mut server).await;
    drop(server);

    assert!(client.unsubscribe(sub.id()).await.is_err());
    assert!(client.subscriptions().is_empty().await);
}

#[tokio::test]
async fn test_unsubscribe_after_broker_close_still_removes_entry() {
    let (client, inbound, mut server) = connected_client().await;
    let mut sub = client.subscribe("/topic/sensor", Ack::Auto).await.unwrap();
    next_frame(&mut server).await;
    server.close(None).await.unwrap();

    let (_trigger, signal) = shutdown::channel();
    client.receive_loop(inbound, signal).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);

    let err = client.unsubscribe(sub.id()).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::NotConnected(ConnectionState::Closed)
    ));
    assert!(client.subscriptions().is_empty().await);
    let closed = tokio::time::timeout(Duration::from_millis(200), sub.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_disconnect_sends_receipt() {
    let (client, _inbound, mut server) = connected_client().await;
    let receipt = Uuid::new_v4();

    client.disconnect(receipt).await.unwrap();

    let frame = next_frame(&mut server).await;
    assert_eq!(frame.verb(), Verb::Disconnect);
    assert_eq!(frame.header("receipt"), Some(receipt.to_string().as_str()));
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.send("/topic/response", b"x", "", None).await.is_err());
}

#[tokio::test]
async fn test_receive_loop_survives_bad_input() {
    let (client, inbound, mut server) = connected_client().await;
    let mut sub = client.subscribe("/topic/motor-control", Ack::Auto).await.unwrap();
    next_frame(&mut server).await;
    let id = sub.id().to_string();

    server.send(WsMessage::text("\n")).await.unwrap();
    server.send(WsMessage::text("BOGUS\n\n\0\n")).await.unwrap();
    let stranger = Uuid::new_v4().to_string();
    send_frame(&mut server, &message_for(&stranger, "lost")).await;
    send_frame(&mut server, &message_for("not-a-uuid", "lost")).await;
    send_frame(&mut server, &message_for(&id, "kept")).await;
    send_frame(
        &mut server,
        &Frame::new(Verb::Connected).with_header("version", "1.2"),
    )
    .await;
    server.close(None).await.unwrap();

    let (_trigger, signal) = shutdown::channel();
    let stats = tokio::time::timeout(Duration::from_secs(2), client.receive_loop(inbound, signal))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        stats,
        ReceiveStats {
            frames: 5,
            delivered: 1,
            unrouted: 2,
            dropped: 0,
            decode_errors: 1,
        }
    );
    assert_eq!(sub.recv().await.unwrap().body(), b"kept");
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_receive_loop_stops_on_shutdown() {
    let (client, inbound, _server) = connected_client().await;
    let (trigger, signal) = shutdown::channel();
    let receiver = {
        let client = client.clone();
        tokio::spawn(async move { client.receive_loop(inbound, signal).await })
    };

    trigger.trigger();

    let stats = tokio::time::timeout(Duration::from_secs(2), receiver)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stats, ReceiveStats::default());
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_receive_loop_stops_on_shutdown_while_subscriber_is_full() {
    let (client_ws, mut server) = ws_pair().await;
    let (client, inbound) =
        BrokerClient::new(client_ws, QueuePolicy::new(1, Overflow::Block), "1.2");
    client.connect().await.unwrap();
    next_frame(&mut server).await;
    let idle = client.subscribe("/topic/sensor", Ack::Auto).await.unwrap();
    next_frame(&mut server).await;
    let id = idle.id().to_string();

    let client = Arc::new(client);
    let (trigger, signal) = shutdown::channel();
    let receiver = {
        let client = client.clone();
        tokio::spawn(async move { client.receive_loop(inbound, signal).await })
    };

    send_frame(&mut server, &message_for(&id, "first")).await;
    send_frame(&mut server, &message_for(&id, "second")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    trigger.trigger();

    let stats = tokio::time::timeout(Duration::from_secs(1), receiver)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(stats.delivered <= 1);
    assert_eq!(stats.dropped, 0);
    drop(idle);
}
