//! Port contracts for failure handling collaborators.

pub mod circuit_store;
pub mod entitlement;
pub mod probe;

pub use circuit_store::{CircuitStateStore, CircuitStoreError, CircuitStoreResult};
#[cfg(test)]
pub use entitlement::MockEntitlementCheck;
pub use entitlement::{EntitlementCheck, EntitlementError};
#[cfg(test)]
pub use probe::MockEndpointProbe;
pub use probe::EndpointProbe;
