//! Application services for the agent registry.

mod registry;

pub use registry::{
    FleetRegistryService, FleetServiceError, FleetServiceResult, RegisterAgentRequest,
};
