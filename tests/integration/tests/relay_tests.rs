//! Relay Integration Tests
//!
//! Each test runs its own gateway over the in-process broker; no external
//! services are needed.
//!
//! Run with: cargo test -p integration-tests --test relay_tests

use std::time::Duration;

use integration_tests::*;
use relay_broker::{BrokerOp, MemoryBroker};
use relay_core::BrokerChannel;
use serde_json::Value;

// ============================================================================
// HTTP Surface
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.unwrap();
    let response = server.get("/health").await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_missing_name_rejected() {
    let server = TestServer::start().await.unwrap();

    assert_eq!(server.upgrade_status("").await.unwrap(), Some(400));
    assert_eq!(server.upgrade_status("?name=").await.unwrap(), Some(400));
    assert_eq!(server.upgrade_status("?name=%20%20").await.unwrap(), Some(400));
    assert_eq!(server.upgrade_status("?name=%23").await.unwrap(), Some(400));
    assert_eq!(server.upgrade_status("?name=amq.gen-1").await.unwrap(), Some(400));

    assert!(server.state.registry().is_empty());
    assert_eq!(server.broker.total_consumers(), 0);
}

#[tokio::test]
async fn test_ws_path_alias() {
    let server = TestServer::start().await.unwrap();
    let name = unique_name("alias");

    let _client = TestClient::connect(&server.ws_url(&format!("ws?name={name}")))
        .await
        .unwrap();

    let broker = server.broker.clone();
    let queue = name.clone();
    eventually(move || broker.consumer_count(&queue) == 1)
        .await
        .unwrap();
}

// ============================================================================
// Session Lifecycle
// ============================================================================

#[tokio::test]
async fn test_connect_builds_topology() {
    let server = TestServer::start().await.unwrap();
    let name = unique_name("alice");

    let _alice = server.connect_ready(&name).await.unwrap();

    assert!(server.state.registry().contains(&name));
    assert_eq!(server.broker.bindings("messages"), vec![(name.clone(), name)]);
}

#[tokio::test]
async fn test_disconnect_cleans_up() {
    let server = TestServer::start().await.unwrap();
    let name = unique_name("alice");

    let alice = server.connect_ready(&name).await.unwrap();
    alice.close().await.unwrap();

    let broker = server.broker.clone();
    eventually(move || broker.cancelled().len() == 1)
        .await
        .unwrap();

    assert!(!server.state.registry().contains(&name));
    assert!(!server.broker.has_queue(&name));
    assert_eq!(server.broker.total_consumers(), 0);
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let server = TestServer::start().await.unwrap();
    let name = unique_name("alice");
    let sender = unique_name("bob");

    let mut first = server.connect_ready(&name).await.unwrap();
    let mut second = server.connect(&name).await.unwrap();

    assert_eq!(second.expect_close().await.unwrap(), 4001);

    // The first holder keeps its name and its queue
    let mut bob = server.connect_ready(&sender).await.unwrap();
    bob.send_json(&message_sent(&name, "still here?"))
        .await
        .unwrap();
    assert_eq!(
        first.recv_json().await.unwrap(),
        message_received(&sender, "still here?")
    );
    assert_eq!(server.broker.consumer_count(&name), 1);
}

#[tokio::test]
async fn test_setup_failure_closes_with_setup_failed() {
    let broker = MemoryBroker::new_shared();
    broker.fail_on(BrokerOp::DeclareQueue);
    let server = TestServer::start_with_broker(broker).await.unwrap();
    let name = unique_name("alice");

    let mut alice = server.connect(&name).await.unwrap();
    assert_eq!(alice.expect_close().await.unwrap(), 4002);

    let registry_state = server.state.clone();
    let queue = name.clone();
    eventually(move || !registry_state.registry().contains(&queue))
        .await
        .unwrap();
    assert_eq!(server.broker.total_consumers(), 0);

    // The name is free again once the broker recovers
    server.broker.recover(BrokerOp::DeclareQueue);
    let _alice = server.connect_ready(&name).await.unwrap();
}

#[tokio::test]
async fn test_disconnect_during_consume_leaves_no_consumer() {
    let server = TestServer::start().await.unwrap();
    let gate = server.broker.gate_consume();
    let name = unique_name("alice");

    let alice = server.connect(&name).await.unwrap();

    // Topology is in place and consume is parked on the gate
    let broker = server.broker.clone();
    let queue = name.clone();
    eventually(move || !broker.bindings("messages").is_empty() && broker.has_queue(&queue))
        .await
        .unwrap();

    alice.close().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The name stays held until the late cancel has run
    let mut early = server.connect(&name).await.unwrap();
    assert_eq!(early.expect_close().await.unwrap(), 4001);

    gate.notify_one();

    let broker = server.broker.clone();
    eventually(move || broker.cancelled().len() == 1)
        .await
        .unwrap();
    let registry_state = server.state.clone();
    let held = name.clone();
    eventually(move || !registry_state.registry().contains(&held))
        .await
        .unwrap();
    assert_eq!(server.broker.total_consumers(), 0);
    assert!(!server.broker.has_queue(&name));

    // Reconnecting now builds a fresh queue and consumer
    gate.notify_one();
    let _alice = server.connect_ready(&name).await.unwrap();
    assert!(server.broker.has_queue(&name));
}

#[tokio::test]
async fn test_disconnect_acks_deliveries_in_flight() {
    let server = TestServer::start().await.unwrap();
    let bob_name = unique_name("bob");
    let bob = server.connect_ready(&bob_name).await.unwrap();

    let payload = serde_json::to_vec(&message_received("alice", "hi")).unwrap();
    for _ in 0..50 {
        server
            .broker
            .publish("messages", &bob_name, &payload)
            .await
            .unwrap();
    }
    bob.close().await.unwrap();

    // Everything handed to the consumer is acked, delivered or not
    let broker = server.broker.clone();
    eventually(move || broker.cancelled().len() == 1 && broker.acked().len() == 50)
        .await
        .unwrap();
    assert_eq!(server.broker.unacked_count(), 0);
}

#[tokio::test]
async fn test_reserved_name_leaves_channel_usable() {
    let server = TestServer::start().await.unwrap();
    let alice_name = unique_name("alice");
    let bob_name = unique_name("bob");

    let mut alice = server.connect_ready(&alice_name).await.unwrap();
    assert_eq!(server.upgrade_status("?name=amq.x").await.unwrap(), Some(400));

    let mut bob = server.connect_ready(&bob_name).await.unwrap();
    bob.send_json(&message_sent(&alice_name, "still up"))
        .await
        .unwrap();
    assert_eq!(
        alice.recv_json().await.unwrap(),
        message_received(&bob_name, "still up")
    );
    assert!(!server.broker.is_closed());
}

#[tokio::test]
async fn test_channel_loss_closes_every_session() {
    let server = TestServer::start().await.unwrap();
    let mut alice = server.connect_ready(&unique_name("alice")).await.unwrap();
    let mut bob = server.connect_ready(&unique_name("bob")).await.unwrap();

    server.broker.close_channel("connection reset by peer");

    assert_eq!(alice.expect_close().await.unwrap(), 4003);
    assert_eq!(bob.expect_close().await.unwrap(), 4003);
}

// ============================================================================
// Message Relay
// ============================================================================

#[tokio::test]
async fn test_message_sent_is_published_with_session_name() {
    let server = TestServer::start().await.unwrap();
    let alice_name = unique_name("alice");

    let mut alice = server.connect_ready(&alice_name).await.unwrap();
    alice
        .send_text(r#"{"type":"MESSAGE_SENT","message":{"to":"bob","from":"mallory","text":"hi"}}"#)
        .await
        .unwrap();

    let broker = server.broker.clone();
    eventually(move || broker.published().len() == 1)
        .await
        .unwrap();

    let published = &server.broker.published()[0];
    assert_eq!(published.exchange, "messages");
    assert_eq!(published.routing_key, "bob");
    let payload: Value = serde_json::from_slice(&published.payload).unwrap();
    assert_eq!(payload, message_received(&alice_name, "hi"));
}

#[tokio::test]
async fn test_message_delivered_and_acked_once() {
    let server = TestServer::start().await.unwrap();
    let alice_name = unique_name("alice");
    let bob_name = unique_name("bob");

    let mut alice = server.connect_ready(&alice_name).await.unwrap();
    let mut bob = server.connect_ready(&bob_name).await.unwrap();

    alice
        .send_json(&message_sent(&bob_name, "hi"))
        .await
        .unwrap();

    assert_eq!(
        bob.recv_json().await.unwrap(),
        message_received(&alice_name, "hi")
    );

    let broker = server.broker.clone();
    eventually(move || broker.acked().len() == 1)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.broker.acked().len(), 1);
    assert_eq!(server.broker.unacked_count(), 0);
}

#[tokio::test]
async fn test_invalid_json_is_dropped() {
    let server = TestServer::start().await.unwrap();
    let alice_name = unique_name("alice");
    let bob_name = unique_name("bob");

    let mut alice = server.connect_ready(&alice_name).await.unwrap();
    let mut bob = server.connect_ready(&bob_name).await.unwrap();

    alice.send_text("{not json").await.unwrap();
    alice
        .send_text(r#"{"type":"TYPING_STARTED","message":{}}"#)
        .await
        .unwrap();
    alice.send_binary(b"\x00\x01").await.unwrap();
    alice.expect_silence(Duration::from_millis(100)).await.unwrap();

    // Same connection still relays
    alice
        .send_json(&message_sent(&bob_name, "after garbage"))
        .await
        .unwrap();
    assert_eq!(
        bob.recv_json().await.unwrap(),
        message_received(&alice_name, "after garbage")
    );
    assert_eq!(server.broker.published().len(), 1);
}

#[tokio::test]
async fn test_routing_reaches_only_recipient() {
    let server = TestServer::start().await.unwrap();
    let alice_name = unique_name("alice");
    let bob_name = unique_name("bob");
    let carol_name = unique_name("carol");

    let mut alice = server.connect_ready(&alice_name).await.unwrap();
    let mut bob = server.connect_ready(&bob_name).await.unwrap();
    let mut carol = server.connect_ready(&carol_name).await.unwrap();

    alice
        .send_json(&message_sent(&bob_name, "just bob"))
        .await
        .unwrap();

    assert_eq!(
        bob.recv_json().await.unwrap(),
        message_received(&alice_name, "just bob")
    );
    carol
        .expect_silence(Duration::from_millis(200))
        .await
        .unwrap();
    alice
        .expect_silence(Duration::from_millis(50))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_conversation_created_fans_out() {
    let server = TestServer::start().await.unwrap();
    let alice_name = unique_name("alice");
    let bob_name = unique_name("bob");
    let carol_name = unique_name("carol");

    let mut alice = server.connect_ready(&alice_name).await.unwrap();
    let mut bob = server.connect_ready(&bob_name).await.unwrap();
    let mut carol = server.connect_ready(&carol_name).await.unwrap();

    let conversation = conversation_created("c1", &[&alice_name, &bob_name, &carol_name]);
    alice.send_json(&conversation).await.unwrap();

    assert_eq!(alice.recv_json().await.unwrap(), conversation);
    assert_eq!(bob.recv_json().await.unwrap(), conversation);
    assert_eq!(carol.recv_json().await.unwrap(), conversation);

    let broker = server.broker.clone();
    eventually(move || broker.acked().len() == 3)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_message_to_offline_client_is_dropped() {
    let server = TestServer::start().await.unwrap();
    let alice_name = unique_name("alice");

    let mut alice = server.connect_ready(&alice_name).await.unwrap();
    alice
        .send_json(&message_sent("nobody-home", "hello?"))
        .await
        .unwrap();

    let broker = server.broker.clone();
    eventually(move || broker.published().len() == 1)
        .await
        .unwrap();
    assert_eq!(server.broker.unacked_count(), 0);
    assert!(!server.broker.has_queue("nobody-home"));
}
