//! Shared world state for fleet control BDD scenarios.

use crate::test_helpers::Fleet;
use relayfleet::fleet::domain::AgentId;
use relayfleet::stream::domain::StreamId;
use rstest::fixture;
use std::collections::HashMap;

/// Scenario world for fleet control behaviour tests.
pub struct FleetWorld {
    pub fleet: Fleet,
    pub agents: HashMap<String, AgentId>,
    pub streams: HashMap<String, StreamId>,
}

impl FleetWorld {
    /// Creates a world with an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fleet: Fleet::new(),
            agents: HashMap::new(),
            streams: HashMap::new(),
        }
    }

    /// Looks up an agent by scenario name.
    ///
    /// # Errors
    ///
    /// Returns an error when the scenario never created the agent.
    pub fn agent(&self, name: &str) -> eyre::Result<AgentId> {
        self.agents
            .get(name)
            .copied()
            .ok_or_else(|| eyre::eyre!("unknown agent {name} in scenario world"))
    }

    /// Looks up a stream by scenario title.
    ///
    /// # Errors
    ///
    /// Returns an error when the scenario never created the stream.
    pub fn stream(&self, title: &str) -> eyre::Result<StreamId> {
        self.streams
            .get(title)
            .copied()
            .ok_or_else(|| eyre::eyre!("unknown stream {title} in scenario world"))
    }

    /// Returns the agent a stream is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error when the stream is unbound.
    pub fn bound_agent(&self, title: &str) -> eyre::Result<AgentId> {
        let id = self.stream(title)?;
        run_async(self.fleet.stream(id))?
            .assigned_agent()
            .ok_or_else(|| eyre::eyre!("stream {title} is not bound to an agent"))
    }
}

impl Default for FleetWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> FleetWorld {
    FleetWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
