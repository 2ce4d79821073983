//! In-memory circuit store.

use crate::resilience::{
    domain::{CircuitState, Endpoint},
    ports::{CircuitStateStore, CircuitStoreError, CircuitStoreResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Circuit store backed by a shared map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCircuitStore {
    circuits: Arc<RwLock<HashMap<Endpoint, CircuitState>>>,
}

impl InMemoryCircuitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: impl std::fmt::Display) -> CircuitStoreError {
    CircuitStoreError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl CircuitStateStore for InMemoryCircuitStore {
    async fn get(&self, endpoint: &Endpoint) -> CircuitStoreResult<Option<CircuitState>> {
        let circuits = self.circuits.read().map_err(poisoned)?;
        Ok(circuits.get(endpoint).cloned())
    }

    async fn put(&self, state: &CircuitState) -> CircuitStoreResult<()> {
        let mut circuits = self.circuits.write().map_err(poisoned)?;
        circuits.insert(state.endpoint().clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> CircuitStoreResult<Vec<CircuitState>> {
        let circuits = self.circuits.read().map_err(poisoned)?;
        let mut all: Vec<CircuitState> = circuits.values().cloned().collect();
        all.sort_by(|left, right| left.endpoint().cmp(right.endpoint()));
        Ok(all)
    }
}
