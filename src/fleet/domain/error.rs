//! Error types for fleet domain validation and parsing.

use super::AgentStatus;
use thiserror::Error;

/// Errors returned while constructing or mutating agent domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FleetDomainError {
    /// The agent name is empty after trimming.
    #[error("agent name must not be empty")]
    EmptyAgentName,

    /// The agent name contains characters outside `[a-z0-9._-]`.
    #[error(
        "agent name '{0}' contains invalid characters (only lowercase alphanumeric, '.', '-' and '_' allowed)"
    )]
    InvalidAgentName(String),

    /// The agent name exceeds the 100-character storage limit.
    #[error("agent name exceeds 100 character limit: {0}")]
    AgentNameTooLong(String),

    /// The agent address is empty after trimming.
    #[error("agent address must not be empty")]
    EmptyAddress,

    /// Declared capacity must allow at least one stream.
    #[error("agent capacity must be at least 1, got {0}")]
    InvalidCapacity(u32),

    /// The software version is empty after trimming.
    #[error("software version must not be empty")]
    EmptySoftwareVersion,

    /// The requested status change is not in the transition table.
    #[error("invalid agent status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: AgentStatus,
        /// Requested status.
        to: AgentStatus,
    },
}

/// Error returned while parsing agent status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown agent status: {0}")]
pub struct ParseAgentStatusError(pub String);
