//! Durable FIFO of streams waiting for capacity.

use crate::stream::domain::StreamId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for wait queue operations.
pub type WaitQueueResult<T> = Result<T, WaitQueueError>;

/// FIFO queue of stream identifiers.
#[async_trait]
pub trait WaitQueue: Send + Sync {
    /// Appends `id` unless it is already queued.
    ///
    /// Returns `false` when the stream was already present; its position is
    /// unchanged.
    async fn push(&self, id: StreamId, at: DateTime<Utc>) -> WaitQueueResult<bool>;

    /// Returns the oldest queued stream without removing it.
    async fn peek(&self) -> WaitQueueResult<Option<StreamId>>;

    /// Removes `id` wherever it sits. Returns whether it was present.
    async fn remove(&self, id: StreamId) -> WaitQueueResult<bool>;

    /// Returns all queued streams in order.
    async fn list(&self) -> WaitQueueResult<Vec<StreamId>>;
}

/// Errors returned by wait queue implementations.
#[derive(Debug, Clone, Error)]
pub enum WaitQueueError {
    /// Persistence-layer failure.
    #[error("queue persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl WaitQueueError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
