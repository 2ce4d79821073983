//! Rolling software updates of agents.
//!
//! An agent is updated only after its running streams have been handed over
//! to the rest of the fleet. The actual rollout (stopping the agent
//! process, installing the new build, starting it again) is delegated to an
//! [`ports::AgentDeployer`] supplied by the embedding application.

pub mod ports;
pub mod services;
