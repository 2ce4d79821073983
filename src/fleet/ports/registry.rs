//! Registry port for agent persistence and atomic load accounting.
//!
//! There is deliberately no "save whole agent" operation: every mutation is
//! a single conditional update so concurrent writers cannot lose each
//! other's changes.

use crate::fleet::domain::{Agent, AgentId, AgentName, AgentStatus, FleetDomainError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for agent registry operations.
pub type AgentRegistryResult<T> = Result<T, AgentRegistryError>;

/// Agent registry persistence contract.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Stores a newly registered agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::DuplicateAgent`] when the identifier
    /// exists or [`AgentRegistryError::DuplicateAgentName`] when the name is
    /// taken.
    async fn register(&self, agent: &Agent) -> AgentRegistryResult<()>;

    /// Finds an agent by identifier.
    ///
    /// Returns `None` when the agent does not exist.
    async fn find_by_id(&self, id: AgentId) -> AgentRegistryResult<Option<Agent>>;

    /// Returns every registered agent.
    async fn list_all(&self) -> AgentRegistryResult<Vec<Agent>>;

    /// Returns the agents currently in `status`.
    async fn list_by_status(&self, status: AgentStatus) -> AgentRegistryResult<Vec<Agent>>;

    /// Claims one slot on an `Active` agent that is below capacity.
    ///
    /// The status check, capacity check and increment happen as one atomic
    /// step. Returns `false` when the agent is not `Active` or is full.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::NotFound`] when the agent does not exist.
    async fn try_reserve_slot(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<bool>;

    /// Releases one slot, saturating at zero.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::NotFound`] when the agent does not exist.
    async fn release_slot(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<()>;

    /// Sets the counted load to `observed` if it still equals `expected`.
    ///
    /// Returns `false` when a concurrent writer changed the count first.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::NotFound`] when the agent does not exist.
    async fn reconcile_stream_count(
        &self,
        id: AgentId,
        expected: u32,
        observed: u32,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<bool>;

    /// Refreshes the agent's liveness timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::NotFound`] when the agent does not exist.
    async fn record_heartbeat(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<()>;

    /// Moves the agent to `to` if its current status is one of
    /// `allowed_from` and the transition table permits the change.
    ///
    /// Returns `false` when the guard does not hold.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::NotFound`] when the agent does not exist.
    async fn transition_status(
        &self,
        id: AgentId,
        allowed_from: &[AgentStatus],
        to: AgentStatus,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<bool>;

    /// Replaces the declared capacity.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::NotFound`] when the agent does not exist
    /// or [`AgentRegistryError::Domain`] for a zero capacity.
    async fn set_capacity(
        &self,
        id: AgentId,
        max_streams: u32,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<()>;

    /// Records the deployed software version.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::NotFound`] when the agent does not exist
    /// or [`AgentRegistryError::Domain`] for a blank version.
    async fn set_software_version(
        &self,
        id: AgentId,
        version: &str,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<()>;

    /// Removes an agent that carries no load.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::NotFound`] when the agent does not exist
    /// or [`AgentRegistryError::Busy`] while streams still count against it.
    async fn deprovision(&self, id: AgentId) -> AgentRegistryResult<()>;
}

/// Errors returned by agent registry implementations.
#[derive(Debug, Clone, Error)]
pub enum AgentRegistryError {
    /// An agent with the same identifier already exists.
    #[error("duplicate agent identifier: {0}")]
    DuplicateAgent(AgentId),

    /// An agent with the same name already exists.
    #[error("duplicate agent name: {0}")]
    DuplicateAgentName(AgentName),

    /// The agent was not found.
    #[error("agent not found: {0}")]
    NotFound(AgentId),

    /// The agent still has streams counted against it.
    #[error("agent {0} still carries streams")]
    Busy(AgentId),

    /// A value was rejected by domain validation.
    #[error(transparent)]
    Domain(#[from] FleetDomainError),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl AgentRegistryError {
    /// Wraps a data-quality or deserialization error from persisted rows.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
