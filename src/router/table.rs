use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use tungstenite::protocol::Message as WsMessage;

use crate::protocol::ConnectionId;

/// Maps a connection identifier to the sending side of its per-connection
/// channel. The transport's writer task drains that channel into the socket,
/// so a send here never blocks the dispatcher.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, UnboundedSender<WsMessage>>,
}

impl ConnectionTable {
    pub fn insert(&mut self, id: ConnectionId, sender: UnboundedSender<WsMessage>) {
        self.connections.insert(id, sender);
    }

    pub fn remove(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Best-effort send of one text frame. A missing or closed connection
    /// is logged and otherwise ignored; it never affects other deliveries.
    pub fn send_text(&self, id: ConnectionId, text: String) {
        match self.connections.get(&id) {
            Some(sender) => {
                if sender.send(WsMessage::text(text)).is_err() {
                    warn!("failed to send to connection {id}");
                }
            }
            None => warn!("no connection registered with id {id}"),
        }
    }

    pub fn send_value(&self, id: ConnectionId, value: &Value) {
        self.send_text(id, value.to_string());
    }
}
