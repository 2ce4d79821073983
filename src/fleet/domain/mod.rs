//! Domain model for fleet agents.
//!
//! Agents carry capacity, load and lifecycle status. All infrastructure
//! concerns are kept outside the domain boundary.

mod agent;
mod capabilities;
mod error;
mod ids;
mod name;
mod status;

pub use agent::{Agent, PersistedAgentData};
pub use capabilities::AgentCapabilities;
pub use error::{FleetDomainError, ParseAgentStatusError};
pub use ids::AgentId;
pub use name::AgentName;
pub use status::AgentStatus;
