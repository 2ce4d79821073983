//! Agent software rollout.

use crate::fleet::domain::Agent;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for deployer operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Installs agent software on a machine.
///
/// Every step is expected to be idempotent so that a retried or rolled-back
/// update converges.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentDeployer: Send + Sync {
    /// Stops the agent process.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the machine cannot be reached or the
    /// process does not stop.
    async fn stop(&self, agent: &Agent) -> DeployResult<()>;

    /// Installs `version`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when installation fails.
    async fn deploy(&self, agent: &Agent, version: &str) -> DeployResult<()>;

    /// Starts the agent process.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the process does not start.
    async fn start(&self, agent: &Agent) -> DeployResult<()>;

    /// Runs the compatibility self-check of the installed `version`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the check cannot be run; a check that
    /// runs and fails returns `Ok(false)`.
    async fn self_check(&self, agent: &Agent, version: &str) -> DeployResult<bool>;

    /// Reinstalls `previous` (or the packaged default when unknown) and
    /// starts the agent again.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the rollback itself fails.
    async fn rollback(&self, agent: &Agent, previous: Option<String>) -> DeployResult<()>;
}

/// Errors returned by deployer implementations.
#[derive(Debug, Clone, Error)]
pub enum DeployError {
    /// The machine could not be reached.
    #[error("agent machine unreachable: {0}")]
    Unreachable(Arc<dyn std::error::Error + Send + Sync>),
    /// A rollout step ran and failed.
    #[error("{step} failed: {message}")]
    StepFailed {
        /// The failing step.
        step: &'static str,
        /// Output of the failing step.
        message: String,
    },
}

impl DeployError {
    /// Wraps a connection failure.
    pub fn unreachable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unreachable(Arc::new(err))
    }

    /// Creates a step failure.
    pub fn step_failed(step: &'static str, message: impl Into<String>) -> Self {
        Self::StepFailed {
            step,
            message: message.into(),
        }
    }
}
