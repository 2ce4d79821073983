//! Publish/subscribe transport port.

use crate::bus::domain::Topic;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// Result type for transport operations.
pub type CommandBusResult<T> = Result<T, CommandBusError>;

/// Topic-addressed publish/subscribe transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Publishes `payload` on `topic` and returns how many subscribers
    /// received it. Zero is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CommandBusError::Transport`] when the transport itself is
    /// unavailable.
    async fn publish(&self, topic: &Topic, payload: Vec<u8>) -> CommandBusResult<usize>;

    /// Subscribes to `topic`. Only messages published afterwards are seen.
    ///
    /// # Errors
    ///
    /// Returns [`CommandBusError::Transport`] when the transport itself is
    /// unavailable.
    async fn subscribe(&self, topic: &Topic) -> CommandBusResult<Subscription>;
}

/// Errors returned by transport implementations.
#[derive(Debug, Clone, Error)]
pub enum CommandBusError {
    /// The transport connection failed.
    #[error("transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl CommandBusError {
    /// Wraps a transport failure.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}

/// A live subscription to one topic.
///
/// Slow subscribers that fall behind skip the messages they missed.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    receiver: broadcast::Receiver<Arc<[u8]>>,
}

impl Subscription {
    /// Wraps a broadcast receiver.
    #[must_use]
    pub const fn new(topic: Topic, receiver: broadcast::Receiver<Arc<[u8]>>) -> Self {
        Self { topic, receiver }
    }

    /// Returns the subscribed topic.
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Waits for the next payload; `None` once the topic is closed.
    pub async fn recv(&mut self) -> Option<Arc<[u8]>> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscriber lagged; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next payload if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<[u8]>> {
        loop {
            match self.receiver.try_recv() {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscriber lagged; messages dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
