//! In-memory agent registry.

mod registry;

pub use registry::InMemoryAgentRegistry;
