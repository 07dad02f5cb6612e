use serde_json::{Value, json};
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use super::Router;
use super::registry::Registry;
use crate::protocol::ConnectionId;

#[test]
fn registry_subscribe_is_idempotent() {
    let mut registry = Registry::new();
    assert!(registry.subscribe(1, "chat"));
    assert!(!registry.subscribe(1, "chat"));
    assert_eq!(registry.size("chat"), 1);
}

#[test]
fn registry_unsubscribe_reports_absence() {
    let mut registry = Registry::new();
    assert!(!registry.unsubscribe(1, "chat"));
    registry.subscribe(1, "chat");
    assert!(registry.unsubscribe(1, "chat"));
    assert!(!registry.unsubscribe(1, "chat"));
}

#[test]
fn registry_prunes_empty_topics() {
    let mut registry = Registry::new();
    registry.subscribe(1, "chat");
    registry.unsubscribe(1, "chat");
    assert!(registry.topics().is_empty());
}

#[test]
fn registry_remove_connection_purges_every_topic() {
    let mut registry = Registry::new();
    registry.subscribe(1, "chat");
    registry.subscribe(1, "news");
    registry.subscribe(2, "news");
    registry.remove_connection(1);
    assert_eq!(registry.topics(), vec!["news".to_string()]);
    assert_eq!(registry.members("news"), vec![2]);
    assert!(!registry.contains("chat", 1));
}

fn connect(router: &Router) -> (ConnectionId, mpsc::UnboundedReceiver<WsMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (router.register(tx), rx)
}

fn next_json(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> Value {
    let message = rx.try_recv().expect("expected an outbound packet");
    serde_json::from_str(message.to_text().expect("text frame")).expect("valid json")
}

fn assert_silent(rx: &mut mpsc::UnboundedReceiver<WsMessage>) {
    assert!(rx.try_recv().is_err(), "expected no outbound packet");
}

#[test]
fn connection_ids_count_up_from_zero() {
    let router = Router::new();
    let (a, _rx_a) = connect(&router);
    let (b, _rx_b) = connect(&router);
    assert_eq!((a, b), (0, 1));
}

#[test]
fn oversized_message_is_rejected_without_parsing() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, &"a".repeat(65535));

    assert_eq!(next_json(&mut rx), json!({ "error": "MessageIsTooLong" }));
}

#[test]
fn non_json_message_is_rejected() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, "definitely not json");

    assert_eq!(next_json(&mut rx), json!({ "error": "InvalidJSON" }));
}

#[test]
fn scalar_message_is_rejected() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, "42");

    assert_eq!(next_json(&mut rx), json!({ "error": "InvalidParams" }));
}

#[test]
fn missing_fields_echo_invalid_params() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, r#"{"topic":"chat"}"#);
    assert_eq!(
        next_json(&mut rx),
        json!({ "topic": "chat", "error": "InvalidParams" })
    );

    router.handle_message(id, r#"{"type":"2","topic":"chat"}"#);
    assert_eq!(
        next_json(&mut rx),
        json!({ "type": "2", "topic": "chat", "error": "InvalidParams" })
    );
}

#[test]
fn long_topic_is_rejected_for_any_type() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);
    let topic = "t".repeat(31);

    for code in [2, 6] {
        router.handle_message(id, &json!({ "type": code, "topic": topic }).to_string());
        assert_eq!(
            next_json(&mut rx),
            json!({ "type": code, "topic": topic, "error": "TopicNameIsTooLong" })
        );
    }
}

#[test]
fn subscribe_returns_peers_and_greets_them() {
    let router = Router::new();
    let (a, mut rx_a) = connect(&router);
    let (b, mut rx_b) = connect(&router);

    router.handle_message(a, r#"{"type":2,"topic":"chat"}"#);
    assert_eq!(
        next_json(&mut rx_a),
        json!({ "type": 2, "topic": "chat", "peers": [] })
    );

    router.handle_message(b, r#"{"type":2,"topic":"chat"}"#);
    // The earlier subscriber learns about the newcomer.
    assert_eq!(
        next_json(&mut rx_a),
        json!({ "type": 7, "topic": "chat", "src": b })
    );
    assert_eq!(
        next_json(&mut rx_b),
        json!({ "type": 2, "topic": "chat", "peers": [a] })
    );
}

#[test]
fn duplicate_subscribe_is_reported_once() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, r#"{"type":2,"topic":"chat"}"#);
    next_json(&mut rx);

    router.handle_message(id, r#"{"type":2,"topic":"chat"}"#);
    assert_eq!(
        next_json(&mut rx),
        json!({ "type": 2, "topic": "chat", "error": "AlreadySubscribed" })
    );
    assert_eq!(router.member_count("chat"), 1);
}

#[test]
fn unsubscribe_when_absent_is_reported() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, r#"{"type":3,"topic":"chat"}"#);
    assert_eq!(
        next_json(&mut rx),
        json!({ "type": 3, "topic": "chat", "error": "NotSubscribed" })
    );
    assert_eq!(router.member_count("chat"), 0);
}

#[test]
fn successful_unsubscribe_has_no_response() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, r#"{"type":2,"topic":"chat"}"#);
    next_json(&mut rx);

    router.handle_message(id, r#"{"type":3,"topic":"chat"}"#);
    assert_silent(&mut rx);
    assert_eq!(router.member_count("chat"), 0);
}

#[test]
fn broadcast_reaches_every_other_member() {
    let router = Router::new();
    let (a, mut rx_a) = connect(&router);
    let (b, mut rx_b) = connect(&router);
    let (c, mut rx_c) = connect(&router);

    for id in [a, b, c] {
        router.handle_message(id, r#"{"type":2,"topic":"chat"}"#);
    }
    while rx_a.try_recv().is_ok() {}
    while rx_b.try_recv().is_ok() {}
    while rx_c.try_recv().is_ok() {}

    router.handle_message(a, r#"{"type":6,"topic":"chat","text":"hi"}"#);

    let expected = json!({ "type": 6, "topic": "chat", "text": "hi", "src": a });
    assert_eq!(next_json(&mut rx_b), expected);
    assert_eq!(next_json(&mut rx_c), expected);
    assert_silent(&mut rx_a);
}

#[test]
fn directed_message_reaches_destination_only() {
    let router = Router::new();
    let (a, mut rx_a) = connect(&router);
    let (b, mut rx_b) = connect(&router);

    router.handle_message(b, r#"{"type":2,"topic":"chat"}"#);
    next_json(&mut rx_b);

    router.handle_message(a, &json!({ "type": 4, "topic": "chat", "dst": b }).to_string());
    assert_eq!(
        next_json(&mut rx_b),
        json!({ "type": 4, "topic": "chat", "dst": b, "src": a })
    );
    assert_silent(&mut rx_a);
}

#[test]
fn message_without_destination_is_rejected() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, r#"{"type":4,"topic":"chat"}"#);
    assert_eq!(
        next_json(&mut rx),
        json!({ "type": 4, "topic": "chat", "error": "NoDestination" })
    );
}

#[test]
fn message_to_absent_destination_is_silently_dropped() {
    let router = Router::new();
    let (a, mut rx_a) = connect(&router);
    let (b, mut rx_b) = connect(&router);

    router.handle_message(a, r#"{"type":4,"topic":"chat","dst":99}"#);
    assert_silent(&mut rx_a);
    assert_silent(&mut rx_b);
    let _ = b;
}

#[test]
fn error_type_packet_is_a_no_op() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, r#"{"type":0,"topic":"keep-alive"}"#);
    assert_silent(&mut rx);
}

#[test]
fn unhandled_type_codes_are_unsupported() {
    let router = Router::new();
    let (id, mut rx) = connect(&router);

    // Echo is in the enum but the relay does not implement it, and 9 is
    // outside the protocol entirely.
    for code in [1, 9] {
        router.handle_message(id, &json!({ "type": code, "topic": "chat" }).to_string());
        assert_eq!(
            next_json(&mut rx),
            json!({ "error": "UnsupportedMessageType" })
        );
    }
}

#[test]
fn disconnect_purges_registry_and_table() {
    let router = Router::new();
    let (a, mut rx_a) = connect(&router);
    let (b, mut rx_b) = connect(&router);

    router.handle_message(a, r#"{"type":2,"topic":"chat"}"#);
    router.handle_message(b, r#"{"type":2,"topic":"chat"}"#);
    while rx_a.try_recv().is_ok() {}
    while rx_b.try_recv().is_ok() {}

    router.disconnect(a);
    assert_eq!(router.members("chat"), vec![b]);

    router.handle_message(b, r#"{"type":6,"topic":"chat"}"#);
    assert_silent(&mut rx_a);
}

#[tokio::test]
async fn validated_packets_are_published_as_events() {
    let router = Router::new();
    let mut events = router.subscribe_events();
    let (id, mut rx) = connect(&router);

    router.handle_message(id, r#"{"type":2,"topic":"chat"}"#);
    next_json(&mut rx);

    let event = events.try_recv().expect("expected a packet event");
    assert_eq!(event, json!({ "type": 2, "topic": "chat" }));
}
