//! Addressed command delivery with bounded retry.

use crate::bus::{
    domain::{AgentCommand, Topic, WireError},
    ports::{CommandBus, CommandBusError},
};
use crate::config::DispatchConfig;
use crate::fleet::domain::AgentId;
use crate::retry::{Backoff, retry_with_backoff};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors returned when a command cannot be delivered.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The command could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The transport stayed unavailable through every attempt.
    #[error(transparent)]
    Transport(#[from] CommandBusError),
    /// Nobody was listening on the agent's topic.
    #[error("agent {agent} is not listening for {command}")]
    NoSubscriber {
        /// Addressed agent.
        agent: AgentId,
        /// Command tag.
        command: &'static str,
    },
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Sends commands to single agents.
#[derive(Clone)]
pub struct CommandDispatcher<B>
where
    B: CommandBus,
{
    bus: Arc<B>,
    attempts: u32,
    backoff: Backoff,
}

impl<B> CommandDispatcher<B>
where
    B: CommandBus,
{
    /// Creates a dispatcher using the configured retry policy.
    #[must_use]
    pub fn new(bus: Arc<B>, config: &DispatchConfig) -> Self {
        Self {
            bus,
            attempts: config.attempts,
            backoff: Backoff::Exponential {
                initial: config.initial_backoff(),
                max: config.max_backoff(),
            },
        }
    }

    /// Returns the underlying transport.
    #[must_use]
    pub const fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// Publishes `command` on `agent`'s topic, retrying with exponential
    /// backoff while the transport fails or nobody is subscribed.
    ///
    /// Returns the number of subscribers that received the command.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoSubscriber`] when the final attempt still
    /// reached nobody, [`DispatchError::Transport`] when the transport kept
    /// failing, or [`DispatchError::Wire`] when encoding failed.
    pub async fn send(&self, agent: AgentId, command: &AgentCommand) -> DispatchResult<usize> {
        let payload = command.encode()?;
        let topic = Topic::agent_commands(agent);
        let tag = command.tag();
        let description = format!("publish {tag} to {topic}");

        let delivered = retry_with_backoff(
            self.attempts,
            self.backoff,
            &description,
            || {
                let body = payload.clone();
                let target = &topic;
                async move {
                    match self.bus.publish(target, body).await? {
                        0 => Err(DispatchError::NoSubscriber {
                            agent,
                            command: tag,
                        }),
                        receivers => Ok(receivers),
                    }
                }
            },
            |err| !matches!(err, DispatchError::Wire(_)),
        )
        .await?;

        debug!(
            agent_id = %agent,
            stream_id = ?command.stream_id(),
            command = tag,
            receivers = delivered,
            "command dispatched"
        );
        Ok(delivered)
    }
}
