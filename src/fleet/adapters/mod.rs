//! Adapter implementations of the agent registry port.

pub mod memory;
pub mod postgres;
