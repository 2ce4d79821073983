//! Repository port for stream persistence.
//!
//! Updates are optimistic: a save succeeds only when the stored revision
//! still equals the revision the caller loaded.

use crate::fleet::domain::AgentId;
use crate::stream::domain::{Stream, StreamId, StreamStatus};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for stream repository operations.
pub type StreamRepositoryResult<T> = Result<T, StreamRepositoryError>;

/// Stream persistence contract.
#[async_trait]
pub trait StreamRepository: Send + Sync {
    /// Stores a new stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamRepositoryError::DuplicateStream`] when the identifier
    /// already exists.
    async fn create(&self, stream: &Stream) -> StreamRepositoryResult<()>;

    /// Saves changes to an existing stream and returns the stored copy with
    /// its new revision.
    ///
    /// # Errors
    ///
    /// Returns [`StreamRepositoryError::NotFound`] when the stream does not
    /// exist or [`StreamRepositoryError::Conflict`] when another writer
    /// saved first.
    async fn update(&self, stream: &Stream) -> StreamRepositoryResult<Stream>;

    /// Finds a stream by identifier.
    async fn find_by_id(&self, id: StreamId) -> StreamRepositoryResult<Option<Stream>>;

    /// Returns the streams in `status`, oldest status change first.
    async fn list_by_status(&self, status: StreamStatus) -> StreamRepositoryResult<Vec<Stream>>;

    /// Returns every stream bound to `agent`, whatever its status.
    async fn list_by_agent(&self, agent: AgentId) -> StreamRepositoryResult<Vec<Stream>>;

    /// Counts the streams that hold a slot on `agent`.
    async fn count_counted_on(&self, agent: AgentId) -> StreamRepositoryResult<u32>;
}

/// Errors returned by stream repository implementations.
#[derive(Debug, Clone, Error)]
pub enum StreamRepositoryError {
    /// A stream with the same identifier already exists.
    #[error("duplicate stream identifier: {0}")]
    DuplicateStream(StreamId),

    /// The stream was not found.
    #[error("stream not found: {0}")]
    NotFound(StreamId),

    /// The stream changed since it was loaded.
    #[error("stream {id} was modified concurrently (expected revision {expected})")]
    Conflict {
        /// Stream identifier.
        id: StreamId,
        /// Revision the caller loaded.
        expected: u64,
    },

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StreamRepositoryError {
    /// Wraps a data-quality or deserialization error from persisted rows.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
