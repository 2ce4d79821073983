//! Stream lifecycle status.

use super::ParseStreamStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a stream.
///
/// `Starting`, `Streaming` and `Stopping` count against an agent's load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Waiting in the allocation queue.
    Pending,
    /// Start command sent; waiting for the agent to confirm.
    Starting,
    /// Relay confirmed running.
    Streaming,
    /// Stop command sent; waiting for the agent to confirm.
    Stopping,
    /// Not running.
    Inactive,
    /// Failed; see the error message.
    Error,
    /// The bound agent stopped heartbeating.
    Partitioned,
}

impl StreamStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Starting,
        Self::Streaming,
        Self::Stopping,
        Self::Inactive,
        Self::Error,
        Self::Partitioned,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Inactive => "inactive",
            Self::Error => "error",
            Self::Partitioned => "partitioned",
        }
    }

    /// Returns whether the status holds a slot on the assigned agent.
    ///
    /// A stopping stream keeps its slot until the agent confirms the stop
    /// or the stopping timeout forces it `Inactive`.
    #[must_use]
    pub const fn counts_against_agent(self) -> bool {
        matches!(self, Self::Starting | Self::Streaming | Self::Stopping)
    }

    /// Returns whether a relay is (about to be) running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::Streaming)
    }

    /// Returns whether `start` may be issued from this status.
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Inactive | Self::Error | Self::Pending)
    }

    /// Returns whether the status is expected to resolve on its own.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }

    /// Returns whether moving to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Pending,
                Self::Starting | Self::Streaming | Self::Inactive | Self::Error
            ) | (
                Self::Starting,
                Self::Starting
                    | Self::Streaming
                    | Self::Stopping
                    | Self::Inactive
                    | Self::Error
                    | Self::Partitioned
            ) | (
                Self::Streaming,
                Self::Starting
                    | Self::Stopping
                    | Self::Inactive
                    | Self::Error
                    | Self::Partitioned
            ) | (
                Self::Stopping,
                Self::Inactive | Self::Error | Self::Partitioned
            ) | (
                Self::Inactive | Self::Error,
                Self::Pending | Self::Starting | Self::Streaming | Self::Inactive
            ) | (
                Self::Partitioned,
                Self::Pending | Self::Streaming | Self::Inactive | Self::Error
            )
        )
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StreamStatus {
    type Error = ParseStreamStatusError;

    fn try_from(value: &str) -> Result<Self, ParseStreamStatusError> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseStreamStatusError(value.to_owned()))
    }
}
