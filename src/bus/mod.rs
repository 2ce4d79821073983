//! Command bus between the control plane and the agents.
//!
//! Commands travel on one topic per agent (`agent.<id>.commands`); agents
//! report status events and heartbeats on two shared topics. Delivery is
//! best-effort: a publish reports how many subscribers received it, and zero
//! means the agent is not listening.
//!
//! - Wire schema in [`domain`]
//! - The transport contract in [`ports`]
//! - The in-process broadcast transport and the WebSocket gateway for
//!   remote agents in [`adapters`]
//! - Dispatch, fan-out and agent-side reporting in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
