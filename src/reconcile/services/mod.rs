//! Handlers for agent reports and the periodic transient sweep.

mod heartbeat;
mod router;
mod status;
mod sweeper;

pub use heartbeat::{HeartbeatHandler, HeartbeatOutcome};
pub use router::EventRouter;
pub use status::{StatusEventHandler, StatusOutcome};
pub use sweeper::{SweepReport, TransientSweeper};

use crate::fleet::ports::AgentRegistryError;
use crate::resilience::ports::CircuitStoreError;
use crate::stream::{
    ports::{StreamRepositoryError, WaitQueueError},
    services::LifecycleError,
};
use thiserror::Error;

/// Errors returned by reconciliation services.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] AgentRegistryError),
    /// Stream lookup failed.
    #[error(transparent)]
    Streams(#[from] StreamRepositoryError),
    /// Queue operation failed.
    #[error(transparent)]
    Queue(#[from] WaitQueueError),
    /// A stream correction failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// Circuit storage failed.
    #[error(transparent)]
    Circuit(#[from] CircuitStoreError),
}

/// Result type for reconciliation services.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
