//! Purpose: Named broadcast topics for side-channel notices (busy flag, store events).
//! Exports: `Bus`, `TopicMessage`.
//! Role: Lets observers react to API activity without coupling to the multiplexer.
//! Invariants: Publishing never blocks and never fails; topics without subscribers drop messages.
//! Invariants: Slow subscribers lag (lose oldest messages) rather than stall publishers.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub struct TopicMessage {
    pub topic: String,
    pub payload: Value,
}

#[derive(Clone, Default)]
pub struct Bus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<TopicMessage>>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<TopicMessage> {
        let mut topics = self.topics.lock().unwrap_or_else(|poison| poison.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Returns the number of subscribers that received the message.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        let sender = {
            let topics = self.topics.lock().unwrap_or_else(|poison| poison.into_inner());
            topics.get(topic).cloned()
        };
        let Some(sender) = sender else {
            return 0;
        };
        sender
            .send(TopicMessage {
                topic: topic.to_string(),
                payload,
            })
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut names: Vec<&String> = topics.keys().collect();
        names.sort();
        f.debug_struct("Bus").field("topics", &names).finish()
    }
}
