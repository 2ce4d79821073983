//! In-process transport built on `tokio` broadcast channels.

use crate::bus::{
    domain::Topic,
    ports::{CommandBus, CommandBusError, CommandBusResult, Subscription},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Default per-topic buffer size.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1_024;

/// In-process publish/subscribe transport, one broadcast channel per topic.
#[derive(Debug, Clone)]
pub struct InMemoryCommandBus {
    topics: Arc<Mutex<HashMap<Topic, broadcast::Sender<Arc<[u8]>>>>>,
    capacity: usize,
}

impl Default for InMemoryCommandBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl InMemoryCommandBus {
    /// Creates a bus with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus buffering `capacity` messages per topic.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    async fn publish(&self, topic: &Topic, payload: Vec<u8>) -> CommandBusResult<usize> {
        let sender = {
            let topics = self.topics.lock().map_err(|err| {
                CommandBusError::transport(std::io::Error::other(err.to_string()))
            })?;
            topics.get(topic).cloned()
        };
        let Some(channel) = sender else {
            return Ok(0);
        };
        Ok(channel.send(Arc::from(payload)).unwrap_or(0))
    }

    async fn subscribe(&self, topic: &Topic) -> CommandBusResult<Subscription> {
        let mut topics = self
            .topics
            .lock()
            .map_err(|err| CommandBusError::transport(std::io::Error::other(err.to_string())))?;
        let receiver = topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        Ok(Subscription::new(topic.clone(), receiver))
    }
}
