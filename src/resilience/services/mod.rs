//! Failure-handling services.

mod circuit;
mod partition;
mod zombie;

pub use circuit::CircuitBreakerService;
pub use partition::{PartitionMonitor, PartitionReport};
pub use zombie::{ReapReport, ZombieReaper};

use crate::fleet::ports::AgentRegistryError;
use crate::resilience::ports::CircuitStoreError;
use crate::stream::{ports::StreamRepositoryError, services::LifecycleError};
use thiserror::Error;

/// Errors returned by failure-handling services.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] AgentRegistryError),
    /// Stream lookup failed.
    #[error(transparent)]
    Streams(#[from] StreamRepositoryError),
    /// A stream correction failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// Circuit storage failed.
    #[error(transparent)]
    Circuit(#[from] CircuitStoreError),
}

/// Result type for failure-handling services.
pub type ResilienceResult<T> = Result<T, ResilienceError>;
