//! Validated agent name type.

use super::FleetDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for an agent name, matching the `VARCHAR(100)` column.
const MAX_NAME_LENGTH: usize = 100;

/// Validated, lowercase hostname-like agent name (e.g. `relay-fra-01`).
///
/// Names break ties when agents are otherwise equally loaded, so they must
/// be unique across the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentName(String);

impl AgentName {
    /// Creates a validated agent name.
    ///
    /// The input is trimmed and lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`FleetDomainError::EmptyAgentName`] when the value is empty
    /// after trimming, [`FleetDomainError::InvalidAgentName`] when it contains
    /// characters outside `[a-z0-9._-]`, or
    /// [`FleetDomainError::AgentNameTooLong`] when it exceeds 100 characters.
    pub fn new(value: impl Into<String>) -> Result<Self, FleetDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(FleetDomainError::EmptyAgentName);
        }

        if normalized.len() > MAX_NAME_LENGTH {
            return Err(FleetDomainError::AgentNameTooLong(raw));
        }

        let is_valid = normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'));

        if !is_valid {
            return Err(FleetDomainError::InvalidAgentName(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the agent name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AgentName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
