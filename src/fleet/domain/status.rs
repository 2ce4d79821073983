//! Agent lifecycle status.

use super::ParseAgentStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a fleet agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered but the machine has not been provisioned yet.
    PendingProvision,
    /// Agent software is being installed.
    Provisioning,
    /// Reachable and eligible for new streams.
    Active,
    /// Shedding streams ahead of a software update.
    PreparingUpdate,
    /// New software is being deployed.
    Updating,
    /// Missed heartbeats; waiting out the recovery window.
    Partitioned,
    /// Needs an operator.
    Failed,
}

impl AgentStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::PendingProvision,
        Self::Provisioning,
        Self::Active,
        Self::PreparingUpdate,
        Self::Updating,
        Self::Partitioned,
        Self::Failed,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingProvision => "pending_provision",
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::PreparingUpdate => "preparing_update",
            Self::Updating => "updating",
            Self::Partitioned => "partitioned",
            Self::Failed => "failed",
        }
    }

    /// Returns whether the allocator may place new streams on the agent.
    #[must_use]
    pub const fn accepts_streams(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns whether the agent is part-way through a software update.
    #[must_use]
    pub const fn is_updating(self) -> bool {
        matches!(self, Self::PreparingUpdate | Self::Updating)
    }

    /// Returns whether moving to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::PendingProvision, Self::Provisioning | Self::Failed)
                | (Self::Provisioning, Self::Active | Self::Failed)
                | (
                    Self::Active,
                    Self::PreparingUpdate | Self::Partitioned | Self::Failed
                )
                | (
                    Self::PreparingUpdate,
                    Self::Active | Self::Updating | Self::Failed
                )
                | (Self::Updating | Self::Partitioned, Self::Active | Self::Failed)
                | (Self::Failed, Self::Provisioning)
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AgentStatus {
    type Error = ParseAgentStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseAgentStatusError(value.to_owned()))
    }
}
