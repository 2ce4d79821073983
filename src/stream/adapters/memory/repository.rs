//! Thread-safe in-memory stream repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::fleet::domain::AgentId;
use crate::stream::{
    domain::{Stream, StreamId, StreamStatus},
    ports::{StreamRepository, StreamRepositoryError, StreamRepositoryResult},
};

/// In-memory stream repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStreamRepository {
    streams: Arc<RwLock<HashMap<StreamId, Stream>>>,
}

impl InMemoryStreamRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn select(
        &self,
        predicate: impl Fn(&Stream) -> bool,
    ) -> StreamRepositoryResult<Vec<Stream>> {
        let streams = self.streams.read().map_err(|err| {
            StreamRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let mut selected: Vec<Stream> = streams
            .values()
            .filter(|stream| predicate(stream))
            .cloned()
            .collect();
        selected.sort_by_key(|stream| (stream.status_changed_at(), stream.id()));
        Ok(selected)
    }
}

#[async_trait]
impl StreamRepository for InMemoryStreamRepository {
    async fn create(&self, stream: &Stream) -> StreamRepositoryResult<()> {
        let mut streams = self.streams.write().map_err(|err| {
            StreamRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        if streams.contains_key(&stream.id()) {
            return Err(StreamRepositoryError::DuplicateStream(stream.id()));
        }
        streams.insert(stream.id(), stream.clone());
        Ok(())
    }

    async fn update(&self, stream: &Stream) -> StreamRepositoryResult<Stream> {
        let mut streams = self.streams.write().map_err(|err| {
            StreamRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let stored = streams
            .get(&stream.id())
            .ok_or(StreamRepositoryError::NotFound(stream.id()))?;
        if stored.revision() != stream.revision() {
            return Err(StreamRepositoryError::Conflict {
                id: stream.id(),
                expected: stream.revision(),
            });
        }
        let mut saved = stream.clone();
        saved.set_revision(stream.revision() + 1);
        streams.insert(saved.id(), saved.clone());
        Ok(saved)
    }

    async fn find_by_id(&self, id: StreamId) -> StreamRepositoryResult<Option<Stream>> {
        let streams = self.streams.read().map_err(|err| {
            StreamRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(streams.get(&id).cloned())
    }

    async fn list_by_status(&self, status: StreamStatus) -> StreamRepositoryResult<Vec<Stream>> {
        self.select(|stream| stream.status() == status)
    }

    async fn list_by_agent(&self, agent: AgentId) -> StreamRepositoryResult<Vec<Stream>> {
        self.select(|stream| stream.assigned_agent() == Some(agent))
    }

    async fn count_counted_on(&self, agent: AgentId) -> StreamRepositoryResult<u32> {
        let counted = self.select(|stream| stream.counted_agent() == Some(agent))?;
        u32::try_from(counted.len()).map_err(StreamRepositoryError::persistence)
    }
}
