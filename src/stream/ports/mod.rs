//! Port contracts for stream persistence and the allocation queue.

pub mod queue;
pub mod repository;

pub use queue::{WaitQueue, WaitQueueError, WaitQueueResult};
pub use repository::{StreamRepository, StreamRepositoryError, StreamRepositoryResult};
