//! Thread-safe in-memory agent registry.
//!
//! Each operation holds the write lock for its whole read-check-write, which
//! gives the same atomicity as a conditional `UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::fleet::{
    domain::{Agent, AgentId, AgentName, AgentStatus},
    ports::{AgentRegistry, AgentRegistryError, AgentRegistryResult},
};

/// In-memory agent registry used by tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentRegistry {
    state: Arc<RwLock<InMemoryFleetState>>,
}

#[derive(Debug, Default)]
struct InMemoryFleetState {
    agents: HashMap<AgentId, Agent>,
    name_index: HashMap<AgentName, AgentId>,
}

impl InMemoryFleetState {
    fn agent_mut(&mut self, id: AgentId) -> AgentRegistryResult<&mut Agent> {
        self.agents
            .get_mut(&id)
            .ok_or(AgentRegistryError::NotFound(id))
    }
}

impl InMemoryAgentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AgentRegistryResult<RwLockReadGuard<'_, InMemoryFleetState>> {
        self.state
            .read()
            .map_err(|err| AgentRegistryError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> AgentRegistryResult<RwLockWriteGuard<'_, InMemoryFleetState>> {
        self.state
            .write()
            .map_err(|err| AgentRegistryError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn register(&self, agent: &Agent) -> AgentRegistryResult<()> {
        let mut state = self.write()?;

        if state.agents.contains_key(&agent.id()) {
            return Err(AgentRegistryError::DuplicateAgent(agent.id()));
        }
        if state.name_index.contains_key(agent.name()) {
            return Err(AgentRegistryError::DuplicateAgentName(agent.name().clone()));
        }

        state.name_index.insert(agent.name().clone(), agent.id());
        state.agents.insert(agent.id(), agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> AgentRegistryResult<Option<Agent>> {
        let state = self.read()?;
        Ok(state.agents.get(&id).cloned())
    }

    async fn list_all(&self) -> AgentRegistryResult<Vec<Agent>> {
        let state = self.read()?;
        let mut agents: Vec<Agent> = state.agents.values().cloned().collect();
        agents.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(agents)
    }

    async fn list_by_status(&self, status: AgentStatus) -> AgentRegistryResult<Vec<Agent>> {
        let state = self.read()?;
        let mut agents: Vec<Agent> = state
            .agents
            .values()
            .filter(|agent| agent.status() == status)
            .cloned()
            .collect();
        agents.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(agents)
    }

    async fn try_reserve_slot(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<bool> {
        let mut state = self.write()?;
        Ok(state.agent_mut(id)?.reserve_slot(at))
    }

    async fn release_slot(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<()> {
        let mut state = self.write()?;
        state.agent_mut(id)?.release_slot(at);
        Ok(())
    }

    async fn reconcile_stream_count(
        &self,
        id: AgentId,
        expected: u32,
        observed: u32,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<bool> {
        let mut state = self.write()?;
        Ok(state
            .agent_mut(id)?
            .reconcile_stream_count(expected, observed, at))
    }

    async fn record_heartbeat(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<()> {
        let mut state = self.write()?;
        state.agent_mut(id)?.record_heartbeat(at);
        Ok(())
    }

    async fn transition_status(
        &self,
        id: AgentId,
        allowed_from: &[AgentStatus],
        to: AgentStatus,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<bool> {
        let mut state = self.write()?;
        let agent = state.agent_mut(id)?;
        if !allowed_from.contains(&agent.status()) {
            return Ok(false);
        }
        Ok(agent.transition_to(to, at).is_ok())
    }

    async fn set_capacity(
        &self,
        id: AgentId,
        max_streams: u32,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<()> {
        let mut state = self.write()?;
        state.agent_mut(id)?.set_capacity(max_streams, at)?;
        Ok(())
    }

    async fn set_software_version(
        &self,
        id: AgentId,
        version: &str,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<()> {
        let mut state = self.write()?;
        state.agent_mut(id)?.set_software_version(version, at)?;
        Ok(())
    }

    async fn deprovision(&self, id: AgentId) -> AgentRegistryResult<()> {
        let mut state = self.write()?;
        let agent = state.agents.get(&id).ok_or(AgentRegistryError::NotFound(id))?;
        if agent.current_streams() > 0 {
            return Err(AgentRegistryError::Busy(id));
        }
        let name = agent.name().clone();
        state.agents.remove(&id);
        state.name_index.remove(&name);
        Ok(())
    }
}
