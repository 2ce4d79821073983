//! Adapter implementations of the failure-handling ports.

mod entitlement;
mod memory;
mod tcp;

pub use entitlement::StaticEntitlements;
pub use memory::InMemoryCircuitStore;
pub use tcp::TcpEndpointProbe;
