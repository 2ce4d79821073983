//! Administrative operations on fleet agents.
//!
//! Provisioning moves an agent from `PendingProvision` to `Active`; the
//! orchestrator never targets an agent before that. Capacity growth wakes the
//! queue drainer.

use crate::fleet::{
    domain::{Agent, AgentCapabilities, AgentId, AgentName, AgentStatus, FleetDomainError},
    ports::{AgentRegistry, AgentRegistryError},
};
use crate::signal::DrainSignal;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Request payload for registering a new agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAgentRequest {
    name: String,
    address: String,
    max_streams: u32,
    capabilities: Vec<String>,
    software_version: Option<String>,
}

impl RegisterAgentRequest {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>, max_streams: u32) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            max_streams,
            capabilities: Vec::new(),
            software_version: None,
        }
    }

    /// Sets the capability tags.
    #[must_use]
    pub fn with_capabilities(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capabilities = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the initially deployed software version.
    #[must_use]
    pub fn with_software_version(mut self, version: impl Into<String>) -> Self {
        self.software_version = Some(version.into());
        self
    }
}

/// Service-level errors for fleet administration.
#[derive(Debug, Error)]
pub enum FleetServiceError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] FleetDomainError),
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] AgentRegistryError),
    /// The agent was not in a status that permits the change.
    #[error("agent {id} cannot move to {to}")]
    Transition {
        /// Agent identifier.
        id: AgentId,
        /// Requested status.
        to: AgentStatus,
    },
}

/// Result type for fleet service operations.
pub type FleetServiceResult<T> = Result<T, FleetServiceError>;

/// Fleet administration service.
#[derive(Clone)]
pub struct FleetRegistryService<R, C>
where
    R: AgentRegistry,
    C: Clock + Send + Sync,
{
    registry: Arc<R>,
    clock: Arc<C>,
    drain: DrainSignal,
}

impl<R, C> FleetRegistryService<R, C>
where
    R: AgentRegistry,
    C: Clock + Send + Sync,
{
    /// Creates a new fleet service.
    #[must_use]
    pub const fn new(registry: Arc<R>, clock: Arc<C>, drain: DrainSignal) -> Self {
        Self {
            registry,
            clock,
            drain,
        }
    }

    /// Registers a new agent in `PendingProvision`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetServiceError::Domain`] when validation fails or
    /// [`FleetServiceError::Registry`] when the registry rejects the agent.
    pub async fn register(&self, request: RegisterAgentRequest) -> FleetServiceResult<Agent> {
        let RegisterAgentRequest {
            name,
            address,
            max_streams,
            capabilities,
            software_version,
        } = request;

        let agent_name = AgentName::new(name)?;
        let tags = AgentCapabilities::new().with_tags(capabilities);
        let mut agent = Agent::new(agent_name, address, max_streams, tags, &*self.clock)?;
        if let Some(version) = software_version {
            agent.set_software_version(&version, self.clock.utc())?;
        }
        self.registry.register(&agent).await?;
        info!(agent_id = %agent.id(), name = %agent.name(), max_streams, "agent registered");
        Ok(agent)
    }

    /// Marks the agent as being provisioned.
    ///
    /// # Errors
    ///
    /// Returns [`FleetServiceError::Transition`] unless the agent is
    /// `PendingProvision` or `Failed`.
    pub async fn begin_provisioning(&self, id: AgentId) -> FleetServiceResult<Agent> {
        self.transition(
            id,
            &[AgentStatus::PendingProvision, AgentStatus::Failed],
            AgentStatus::Provisioning,
        )
        .await
    }

    /// Marks a provisioned agent `Active`, making it eligible for streams.
    ///
    /// # Errors
    ///
    /// Returns [`FleetServiceError::Transition`] unless the agent is
    /// `Provisioning`.
    pub async fn mark_provisioned(&self, id: AgentId) -> FleetServiceResult<Agent> {
        let agent = self
            .transition(id, &[AgentStatus::Provisioning], AgentStatus::Active)
            .await?;
        self.drain.raise();
        Ok(agent)
    }

    /// Changes the declared capacity; growth wakes the queue drainer.
    ///
    /// # Errors
    ///
    /// Returns [`FleetServiceError::Registry`] when the agent is missing or
    /// the capacity is zero.
    pub async fn set_capacity(&self, id: AgentId, max_streams: u32) -> FleetServiceResult<Agent> {
        let before = self.find_or_error(id).await?;
        self.registry
            .set_capacity(id, max_streams, self.clock.utc())
            .await?;
        if max_streams > before.max_streams() {
            self.drain.raise();
        }
        info!(agent_id = %id, from = before.max_streams(), to = max_streams, "agent capacity changed");
        self.find_or_error(id).await
    }

    /// Removes an agent that carries no streams.
    ///
    /// # Errors
    ///
    /// Returns [`FleetServiceError::Registry`] when the agent is missing or
    /// still busy.
    pub async fn deprovision(&self, id: AgentId) -> FleetServiceResult<()> {
        self.registry.deprovision(id).await?;
        info!(agent_id = %id, "agent deprovisioned");
        Ok(())
    }

    /// Finds an agent by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`FleetServiceError::Registry`] when lookup fails.
    pub async fn find_by_id(&self, id: AgentId) -> FleetServiceResult<Option<Agent>> {
        Ok(self.registry.find_by_id(id).await?)
    }

    /// Returns every registered agent.
    ///
    /// # Errors
    ///
    /// Returns [`FleetServiceError::Registry`] when lookup fails.
    pub async fn list_all(&self) -> FleetServiceResult<Vec<Agent>> {
        Ok(self.registry.list_all().await?)
    }

    /// Returns the agents eligible for new streams.
    ///
    /// # Errors
    ///
    /// Returns [`FleetServiceError::Registry`] when lookup fails.
    pub async fn list_active(&self) -> FleetServiceResult<Vec<Agent>> {
        Ok(self.registry.list_by_status(AgentStatus::Active).await?)
    }

    async fn transition(
        &self,
        id: AgentId,
        allowed_from: &[AgentStatus],
        to: AgentStatus,
    ) -> FleetServiceResult<Agent> {
        let moved = self
            .registry
            .transition_status(id, allowed_from, to, self.clock.utc())
            .await?;
        if !moved {
            return Err(FleetServiceError::Transition { id, to });
        }
        info!(agent_id = %id, status = %to, "agent status changed");
        self.find_or_error(id).await
    }

    async fn find_or_error(&self, id: AgentId) -> FleetServiceResult<Agent> {
        self.registry
            .find_by_id(id)
            .await?
            .ok_or_else(|| AgentRegistryError::NotFound(id).into())
    }
}
