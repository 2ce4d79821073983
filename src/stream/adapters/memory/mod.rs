//! In-memory stream store and wait queue.

mod queue;
mod repository;

pub use queue::InMemoryWaitQueue;
pub use repository::InMemoryStreamRepository;
