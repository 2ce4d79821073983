//! Agent aggregate root.

use super::{AgentCapabilities, AgentId, AgentName, AgentStatus, FleetDomainError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// A worker machine that runs relay processes.
///
/// `current_streams` is the counted load: the number of streams bound to this
/// agent in `STARTING` or `STREAMING`. It only moves through the registry
/// port, never by saving a whole aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    id: AgentId,
    name: AgentName,
    address: String,
    max_streams: u32,
    current_streams: u32,
    status: AgentStatus,
    last_heartbeat_at: Option<DateTime<Utc>>,
    status_changed_at: DateTime<Utc>,
    capabilities: AgentCapabilities,
    software_version: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedAgentData {
    /// Persisted agent identifier.
    pub id: AgentId,
    /// Persisted agent name.
    pub name: AgentName,
    /// Persisted network address.
    pub address: String,
    /// Persisted declared capacity.
    pub max_streams: u32,
    /// Persisted counted load.
    pub current_streams: u32,
    /// Persisted lifecycle status.
    pub status: AgentStatus,
    /// Persisted liveness timestamp.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Persisted status change timestamp.
    pub status_changed_at: DateTime<Utc>,
    /// Persisted capability set.
    pub capabilities: AgentCapabilities,
    /// Persisted deployed software version.
    pub software_version: Option<String>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Creates a new agent in `PendingProvision` with no load.
    ///
    /// # Errors
    ///
    /// Returns [`FleetDomainError::EmptyAddress`] when the address is blank or
    /// [`FleetDomainError::InvalidCapacity`] when `max_streams` is zero.
    pub fn new(
        name: AgentName,
        address: impl Into<String>,
        max_streams: u32,
        capabilities: AgentCapabilities,
        clock: &impl Clock,
    ) -> Result<Self, FleetDomainError> {
        let address_val = address.into().trim().to_owned();
        if address_val.is_empty() {
            return Err(FleetDomainError::EmptyAddress);
        }
        if max_streams == 0 {
            return Err(FleetDomainError::InvalidCapacity(max_streams));
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: AgentId::new(),
            name,
            address: address_val,
            max_streams,
            current_streams: 0,
            status: AgentStatus::PendingProvision,
            last_heartbeat_at: None,
            status_changed_at: timestamp,
            capabilities,
            software_version: None,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs an agent from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedAgentData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            address: data.address,
            max_streams: data.max_streams,
            current_streams: data.current_streams,
            status: data.status,
            last_heartbeat_at: data.last_heartbeat_at,
            status_changed_at: data.status_changed_at,
            capabilities: data.capabilities,
            software_version: data.software_version,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the agent identifier.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Returns the agent name.
    #[must_use]
    pub const fn name(&self) -> &AgentName {
        &self.name
    }

    /// Returns the network address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the declared capacity.
    #[must_use]
    pub const fn max_streams(&self) -> u32 {
        self.max_streams
    }

    /// Returns the counted load.
    #[must_use]
    pub const fn current_streams(&self) -> u32 {
        self.current_streams
    }

    /// Returns the number of unclaimed slots.
    #[must_use]
    pub const fn free_slots(&self) -> u32 {
        self.max_streams.saturating_sub(self.current_streams)
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> AgentStatus {
        self.status
    }

    /// Returns the last heartbeat timestamp, if any arrived.
    #[must_use]
    pub const fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat_at
    }

    /// Returns when the status last changed.
    #[must_use]
    pub const fn status_changed_at(&self) -> DateTime<Utc> {
        self.status_changed_at
    }

    /// Returns the liveness reference: the last heartbeat, or the last status
    /// change when the agent never heartbeated.
    #[must_use]
    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_heartbeat_at
            .map_or(self.status_changed_at, |at| at.max(self.status_changed_at))
    }

    /// Returns the capability set.
    #[must_use]
    pub const fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    /// Returns the deployed software version, if known.
    #[must_use]
    pub fn software_version(&self) -> Option<&str> {
        self.software_version.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest change timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Claims one slot when the agent is `Active` and below capacity.
    ///
    /// Returns `false` and leaves the agent unchanged otherwise.
    pub fn reserve_slot(&mut self, at: DateTime<Utc>) -> bool {
        if !self.status.accepts_streams() || self.current_streams >= self.max_streams {
            return false;
        }
        self.current_streams += 1;
        self.updated_at = at;
        true
    }

    /// Releases one slot, never going below zero.
    pub fn release_slot(&mut self, at: DateTime<Utc>) {
        self.current_streams = self.current_streams.saturating_sub(1);
        self.updated_at = at;
    }

    /// Overwrites the counted load when it still equals `expected`.
    pub fn reconcile_stream_count(
        &mut self,
        expected: u32,
        observed: u32,
        at: DateTime<Utc>,
    ) -> bool {
        if self.current_streams != expected {
            return false;
        }
        self.current_streams = observed;
        self.updated_at = at;
        true
    }

    /// Refreshes the liveness timestamp.
    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat_at = Some(at);
        self.updated_at = at;
    }

    /// Moves the agent to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetDomainError::InvalidTransition`] when the transition
    /// table forbids the change.
    pub fn transition_to(
        &mut self,
        target: AgentStatus,
        at: DateTime<Utc>,
    ) -> Result<(), FleetDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(FleetDomainError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.status_changed_at = at;
        self.updated_at = at;
        Ok(())
    }

    /// Replaces the declared capacity.
    ///
    /// # Errors
    ///
    /// Returns [`FleetDomainError::InvalidCapacity`] when `max_streams` is
    /// zero.
    pub fn set_capacity(
        &mut self,
        max_streams: u32,
        at: DateTime<Utc>,
    ) -> Result<(), FleetDomainError> {
        if max_streams == 0 {
            return Err(FleetDomainError::InvalidCapacity(max_streams));
        }
        self.max_streams = max_streams;
        self.updated_at = at;
        Ok(())
    }

    /// Records the deployed software version.
    ///
    /// # Errors
    ///
    /// Returns [`FleetDomainError::EmptySoftwareVersion`] when the version is
    /// blank.
    pub fn set_software_version(
        &mut self,
        version: &str,
        at: DateTime<Utc>,
    ) -> Result<(), FleetDomainError> {
        let trimmed = version.trim();
        if trimmed.is_empty() {
            return Err(FleetDomainError::EmptySoftwareVersion);
        }
        self.software_version = Some(trimmed.to_owned());
        self.updated_at = at;
        Ok(())
    }
}
