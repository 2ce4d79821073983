//! Agent registry for the relay fleet.
//!
//! Agents are the worker machines that run one relay process per active
//! stream. The registry owns their declared capacity, their counted load and
//! their lifecycle status. Load and status only change through the atomic
//! operations on [`ports::AgentRegistry`], so concurrent allocations can never
//! both claim an agent's last free slot.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Administrative services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
