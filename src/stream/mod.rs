//! Streams, their placement on agents and their lifecycle.
//!
//! A stream is one logical broadcast: an ordered list of source files relayed
//! to one or more ingest endpoints by a single agent. This module owns the
//! stream state machine, the allocator that binds streams to agents under the
//! load-count invariant, the FIFO wait queue used when the fleet is full, and
//! the lifecycle controller that turns user intent into agent commands.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Allocation and lifecycle services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
