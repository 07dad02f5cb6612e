use std::collections::{HashMap, HashSet};

use crate::protocol::ConnectionId;

/// The routing ground truth: which connection is subscribed to which topic.
///
/// Membership is unique per (topic, id) pair by construction. An identifier
/// appears under a topic if and only if the connection issued a successful
/// subscribe for that topic and has not since unsubscribed or disconnected.
/// Topics with no remaining members are pruned.
#[derive(Debug, Default)]
pub struct Registry {
    topics: HashMap<String, HashSet<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` to the topic's member set. Returns false (and performs no
    /// change) if `id` is already a member.
    pub fn subscribe(&mut self, id: ConnectionId, topic: &str) -> bool {
        self.topics.entry(topic.to_string()).or_default().insert(id)
    }

    /// Removes `id` from the topic's member set. Returns false if `id` was
    /// not a member.
    pub fn unsubscribe(&mut self, id: ConnectionId, topic: &str) -> bool {
        match self.topics.get_mut(topic) {
            Some(members) => {
                let removed = members.remove(&id);
                if members.is_empty() {
                    self.topics.remove(topic);
                }
                removed
            }
            None => false,
        }
    }

    /// Current members of a topic, in no particular order.
    pub fn members(&self, topic: &str) -> Vec<ConnectionId> {
        self.topics
            .get(topic)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, topic: &str, id: ConnectionId) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|members| members.contains(&id))
    }

    pub fn size(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, HashSet::len)
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    /// Purges `id` from every topic. Used on connection teardown.
    pub fn remove_connection(&mut self, id: ConnectionId) {
        self.topics.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
    }
}
