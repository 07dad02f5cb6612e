use std::sync::Mutex;

use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;

use crate::protocol::{ConnectionId, MAX_MESSAGE_BYTES, MAX_TOPIC_CHARS, PacketType, RouteError};
use crate::router::registry::Registry;
use crate::router::table::ConnectionTable;

/// Capacity of the observability stream. Slow subscribers lose old events
/// rather than blocking the dispatcher.
const EVENT_CHANNEL_CAPACITY: usize = 64;

struct RouterState {
    next_id: ConnectionId,
    registry: Registry,
    connections: ConnectionTable,
}

/// Validates inbound packets and executes the protocol state transitions
/// against the subscription registry and the connection table.
///
/// All state lives behind a single mutex held for the duration of one
/// inbound message or lifecycle event, so every transition is atomic with
/// respect to every other.
pub struct Router {
    state: Mutex<RouterState>,
    events: broadcast::Sender<Value>,
}

impl Router {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(RouterState {
                next_id: 0,
                registry: Registry::new(),
                connections: ConnectionTable::default(),
            }),
            events,
        }
    }

    /// Registers a newly accepted connection and returns its identifier.
    /// Identifiers count up from 0 and are never reused while the process
    /// runs.
    pub fn register(&self, sender: UnboundedSender<WsMessage>) -> ConnectionId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.connections.insert(id, sender);
        debug!("connection {id} registered");
        id
    }

    /// Tears a connection down: removes it from every topic and deletes the
    /// connection-table entry. The only retirement path; there is no
    /// goodbye packet.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.lock().unwrap();
        state.registry.remove_connection(id);
        state.connections.remove(id);
        debug!("connection {id} removed");
    }

    /// Subscribes to shallow copies of every packet that passes field
    /// validation, for external metrics or logging collaborators.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Value> {
        self.events.subscribe()
    }

    pub fn topics(&self) -> Vec<String> {
        self.state.lock().unwrap().registry.topics()
    }

    pub fn members(&self, topic: &str) -> Vec<ConnectionId> {
        self.state.lock().unwrap().registry.members(topic)
    }

    pub fn member_count(&self, topic: &str) -> usize {
        self.state.lock().unwrap().registry.size(topic)
    }

    /// Processes one raw inbound message from connection `id`.
    ///
    /// The validation pipeline short-circuits on the first failure and
    /// always answers the sender with the original packet plus an `error`
    /// field, except where the protocol is deliberately fire-and-forget
    /// (successful unsubscribe, directed message to an absent destination).
    pub fn handle_message(&self, id: ConnectionId, raw: &str) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if raw.len() > MAX_MESSAGE_BYTES {
            // Not parsed, so there is nothing to echo.
            let response = json!({ "error": RouteError::MessageIsTooLong.as_str() });
            state.connections.send_value(id, &response);
            return;
        }

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => {
                let response = json!({ "error": RouteError::InvalidJson.as_str() });
                state.connections.send_value(id, &response);
                return;
            }
        };

        let Value::Object(mut packet) = value else {
            let response = json!({ "error": RouteError::InvalidParams.as_str() });
            state.connections.send_value(id, &response);
            return;
        };

        let code = packet.get("type").and_then(Value::as_u64);
        let topic = packet
            .get("topic")
            .and_then(Value::as_str)
            .map(str::to_string);
        let (Some(code), Some(topic)) = (code, topic) else {
            Self::echo_error(state, id, packet, RouteError::InvalidParams);
            return;
        };

        let _ = self.events.send(Value::Object(packet.clone()));

        if topic.chars().count() > MAX_TOPIC_CHARS {
            Self::echo_error(state, id, packet, RouteError::TopicNameIsTooLong);
            return;
        }

        match PacketType::from_code(code) {
            Some(PacketType::Subscribe) => Self::handle_subscribe(state, id, topic, packet),
            Some(PacketType::Unsubscribe) => {
                if !state.registry.unsubscribe(id, &topic) {
                    Self::echo_error(state, id, packet, RouteError::NotSubscribed);
                }
                // Success is fire-and-forget.
            }
            Some(PacketType::Broadcast) => {
                packet.insert("src".to_string(), json!(id));
                let text = Value::Object(packet).to_string();
                for member in state.registry.members(&topic) {
                    if member != id {
                        state.connections.send_text(member, text.clone());
                    }
                }
            }
            Some(PacketType::Message) => {
                let Some(dst) = packet.get("dst").and_then(Value::as_u64) else {
                    Self::echo_error(state, id, packet, RouteError::NoDestination);
                    return;
                };
                // A destination that is not subscribed to the topic is a
                // silent drop; the sender cannot distinguish "rejected"
                // from "target absent".
                if state.registry.contains(&topic, dst) {
                    packet.insert("src".to_string(), json!(id));
                    state.connections.send_value(dst, &Value::Object(packet));
                }
            }
            // Idle keep-alive ping from a client.
            Some(PacketType::Error) => {}
            _ => {
                let response = json!({ "error": RouteError::UnsupportedMessageType.as_str() });
                state.connections.send_value(id, &response);
            }
        }
    }

    fn handle_subscribe(
        state: &mut RouterState,
        id: ConnectionId,
        topic: String,
        mut packet: Map<String, Value>,
    ) {
        if !state.registry.subscribe(id, &topic) {
            Self::echo_error(state, id, packet, RouteError::AlreadySubscribed);
            return;
        }

        let mut peers: Vec<ConnectionId> = state
            .registry
            .members(&topic)
            .into_iter()
            .filter(|&member| member != id)
            .collect();
        peers.sort_unstable();

        let hello = json!({
            "type": u8::from(PacketType::Hello),
            "topic": topic,
            "src": id,
        })
        .to_string();
        for &peer in &peers {
            state.connections.send_text(peer, hello.clone());
        }

        packet.insert("peers".to_string(), json!(peers));
        state.connections.send_value(id, &Value::Object(packet));
    }

    fn echo_error(
        state: &RouterState,
        id: ConnectionId,
        mut packet: Map<String, Value>,
        error: RouteError,
    ) {
        packet.insert("error".to_string(), Value::from(error.as_str()));
        state.connections.send_value(id, &Value::Object(packet));
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
