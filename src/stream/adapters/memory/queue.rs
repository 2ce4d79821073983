//! In-memory FIFO wait queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::stream::{
    domain::StreamId,
    ports::{WaitQueue, WaitQueueError, WaitQueueResult},
};

/// In-memory wait queue.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWaitQueue {
    entries: Arc<Mutex<VecDeque<StreamId>>>,
}

impl InMemoryWaitQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> WaitQueueResult<std::sync::MutexGuard<'_, VecDeque<StreamId>>> {
        self.entries
            .lock()
            .map_err(|err| WaitQueueError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl WaitQueue for InMemoryWaitQueue {
    async fn push(&self, id: StreamId, _at: DateTime<Utc>) -> WaitQueueResult<bool> {
        let mut entries = self.lock()?;
        if entries.contains(&id) {
            return Ok(false);
        }
        entries.push_back(id);
        Ok(true)
    }

    async fn peek(&self) -> WaitQueueResult<Option<StreamId>> {
        Ok(self.lock()?.front().copied())
    }

    async fn remove(&self, id: StreamId) -> WaitQueueResult<bool> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|entry| *entry != id);
        Ok(entries.len() != before)
    }

    async fn list(&self) -> WaitQueueResult<Vec<StreamId>> {
        Ok(self.lock()?.iter().copied().collect())
    }
}
