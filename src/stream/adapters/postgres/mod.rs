//! `PostgreSQL` adapters for streams and the wait queue.

mod models;
mod queue;
mod repository;
mod schema;

pub use queue::PostgresWaitQueue;
pub use repository::PostgresStreamRepository;
