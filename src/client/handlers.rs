use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::Packet;

/// Callback invoked for every inbound broadcast or directed message on a
/// subscribed topic.
pub type Handler = Arc<dyn Fn(&Packet) + Send + Sync>;

/// Token identifying one registered handler, returned by `subscribe` and
/// accepted by `unsubscribe_handler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

/// Per-topic collection of locally registered callbacks, in registration
/// order. The key set of this map is the client's view of "currently
/// subscribed topics", which is what gets replayed after a reconnection.
#[derive(Default)]
pub struct HandlerMap {
    next_id: u64,
    topics: HashMap<String, Vec<(HandlerId, Handler)>>,
}

impl HandlerMap {
    pub fn add(&mut self, topic: &str, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes one handler. Returns false if it was not registered for the
    /// topic. A topic with no remaining handlers disappears from the map.
    pub fn remove(&mut self, topic: &str, id: HandlerId) -> bool {
        match self.topics.get_mut(topic) {
            Some(handlers) => {
                let before = handlers.len();
                handlers.retain(|(handler_id, _)| *handler_id != id);
                let removed = handlers.len() != before;
                if handlers.is_empty() {
                    self.topics.remove(topic);
                }
                removed
            }
            None => false,
        }
    }

    pub fn clear(&mut self, topic: &str) {
        self.topics.remove(topic);
    }

    pub fn has_handlers(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    /// Snapshot of a topic's handlers, in registration order. Cloned out so
    /// callbacks can be invoked without holding the map's lock.
    pub fn handlers_for(&self, topic: &str) -> Vec<Handler> {
        self.topics
            .get(topic)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}
