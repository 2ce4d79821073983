//! Bus topic names.

use crate::fleet::domain::AgentId;
use std::fmt;
use uuid::Uuid;

/// Shared topic agents publish status events to.
pub const STATUS_TOPIC: &str = "fleet.status";

/// Shared topic agents publish heartbeats to.
pub const HEARTBEAT_TOPIC: &str = "fleet.heartbeat";

/// A bus topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// The command topic of one agent.
    #[must_use]
    pub fn agent_commands(agent: AgentId) -> Self {
        Self(format!("agent.{agent}.commands"))
    }

    /// The shared status topic.
    #[must_use]
    pub fn status() -> Self {
        Self(STATUS_TOPIC.to_owned())
    }

    /// The shared heartbeat topic.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self(HEARTBEAT_TOPIC.to_owned())
    }

    /// Parses a topic name received from a remote peer.
    ///
    /// Only the shared topics and per-agent command topics exist; any other
    /// name yields `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name == STATUS_TOPIC || name == HEARTBEAT_TOPIC {
            return Some(Self(name.to_owned()));
        }
        let agent = name.strip_prefix("agent.")?.strip_suffix(".commands")?;
        let id = Uuid::parse_str(agent).ok()?;
        Some(Self::agent_commands(AgentId::from_uuid(id)))
    }

    /// Returns the topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
