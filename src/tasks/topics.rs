//! Topic → callback table owned by the session task.
//!
//! Fixed capacity, exact-match lookup, unique topic names.  Entries are
//! never removed individually; the whole table is cleared when the
//! session task finishes.

use heapless::{String, Vec};

use crate::app::ports::{InboundMessage, QoS};
use crate::error::{Error, Result};

pub const MAX_TOPIC_CALLBACKS: usize = 50;
pub const MAX_TOPIC_LEN: usize = 100;

/// Called synchronously from the session worker for each matching message.
pub type TopicCallback = Box<dyn FnMut(&InboundMessage) + Send>;

struct Registration {
    topic: String<MAX_TOPIC_LEN>,
    max_qos: QoS,
    callback: TopicCallback,
}

#[derive(Default)]
pub struct TopicTable {
    entries: Vec<Registration, MAX_TOPIC_CALLBACKS>,
}

impl TopicTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.iter().any(|e| e.topic == topic)
    }

    pub fn register(&mut self, topic: &str, max_qos: QoS, callback: TopicCallback) -> Result<()> {
        if topic.is_empty() {
            return Err(Error::ConfigurationInvalid("empty topic"));
        }
        if self.contains(topic) {
            return Err(Error::ConfigurationInvalid("topic already registered"));
        }
        let mut name = String::new();
        name.push_str(topic)
            .map_err(|()| Error::ConfigurationInvalid("topic too long"))?;
        self.entries
            .push(Registration {
                topic: name,
                max_qos,
                callback,
            })
            .map_err(|_| Error::ResourceExhausted("topic table full"))
    }

    /// Remove the most recent registration of `topic` (used when the
    /// broker refused the subscribe that went with it).
    pub(crate) fn unregister_last(&mut self, topic: &str) {
        if self.entries.last().is_some_and(|e| e.topic == topic) {
            self.entries.pop();
        }
    }

    /// Invoke the callback registered for `message.topic`.
    /// Returns `false` if no callback matched.
    pub fn dispatch(&mut self, message: &InboundMessage) -> bool {
        match self.entries.iter_mut().find(|e| e.topic == message.topic.as_str()) {
            Some(entry) => {
                (entry.callback)(message);
                true
            }
            None => false,
        }
    }

    /// Registered topics with their maximum QoS, in registration order.
    pub fn subscriptions(&self) -> impl Iterator<Item = (&str, QoS)> + '_ {
        self.entries.iter().map(|e| (e.topic.as_str(), e.max_qos))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
