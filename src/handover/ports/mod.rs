//! Port contracts for software rollout.

pub mod deployer;

#[cfg(test)]
pub use deployer::MockAgentDeployer;
pub use deployer::{AgentDeployer, DeployError, DeployResult};
