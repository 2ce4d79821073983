//! Storage for circuit state.
//!
//! Circuit state is advisory: losing it only resets every endpoint to
//! closed.

use crate::resilience::domain::{CircuitState, Endpoint};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for circuit store operations.
pub type CircuitStoreResult<T> = Result<T, CircuitStoreError>;

/// Keeps per-endpoint circuit state.
#[async_trait]
pub trait CircuitStateStore: Send + Sync {
    /// Returns the state of `endpoint`, if tracked.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitStoreError::Persistence`] when the store fails.
    async fn get(&self, endpoint: &Endpoint) -> CircuitStoreResult<Option<CircuitState>>;

    /// Stores `state`, replacing the previous state of its endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitStoreError::Persistence`] when the store fails.
    async fn put(&self, state: &CircuitState) -> CircuitStoreResult<()>;

    /// Returns every tracked circuit.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitStoreError::Persistence`] when the store fails.
    async fn list(&self) -> CircuitStoreResult<Vec<CircuitState>>;
}

/// Errors returned by circuit stores.
#[derive(Debug, Clone, Error)]
pub enum CircuitStoreError {
    /// Storage failed.
    #[error("circuit store error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl CircuitStoreError {
    /// Wraps a storage failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
