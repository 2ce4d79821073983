//! Agent-side view of the bus.
//!
//! Agents receive their commands on their own topic and publish status
//! events and heartbeats on the shared topics. The control plane does not
//! use this type; simulated agents and tests do.

use crate::bus::{
    domain::{AgentCommand, AgentEvent, Heartbeat, StatusEvent, Topic, WireError},
    ports::{CommandBus, CommandBusError, CommandBusResult, Subscription},
};
use crate::fleet::domain::AgentId;
use crate::stream::domain::StreamId;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned while reporting to the control plane.
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    /// The event could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] CommandBusError),
}

/// Publishes events on behalf of one agent.
#[derive(Clone)]
pub struct AgentReporter<B>
where
    B: CommandBus,
{
    bus: Arc<B>,
    agent: AgentId,
}

impl<B> AgentReporter<B>
where
    B: CommandBus,
{
    /// Creates a reporter for `agent`.
    #[must_use]
    pub const fn new(bus: Arc<B>, agent: AgentId) -> Self {
        Self { bus, agent }
    }

    /// Returns the reporting agent.
    #[must_use]
    pub const fn agent(&self) -> AgentId {
        self.agent
    }

    /// Subscribes to this agent's command topic.
    ///
    /// # Errors
    ///
    /// Returns the transport error when subscribing fails.
    pub async fn inbox(&self) -> CommandBusResult<AgentInbox> {
        let subscription = self.bus.subscribe(&Topic::agent_commands(self.agent)).await?;
        Ok(AgentInbox { subscription })
    }

    /// Publishes a status event.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when encoding or publishing fails.
    pub async fn report(&self, event: StatusEvent) -> Result<usize, ReportError> {
        let payload = AgentEvent::Status(event).encode()?;
        Ok(self.bus.publish(&Topic::status(), payload).await?)
    }

    /// Publishes a heartbeat listing `active_streams`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when encoding or publishing fails.
    pub async fn heartbeat(&self, active_streams: Vec<StreamId>) -> Result<usize, ReportError> {
        let payload = AgentEvent::Heartbeat(Heartbeat {
            vps_id: self.agent,
            active_streams,
        })
        .encode()?;
        Ok(self.bus.publish(&Topic::heartbeat(), payload).await?)
    }
}

/// Commands received by one agent.
#[derive(Debug)]
pub struct AgentInbox {
    subscription: Subscription,
}

impl AgentInbox {
    /// Waits for the next command; `None` once the topic closes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] for a payload that is not a known
    /// command.
    pub async fn next(&mut self) -> Option<Result<AgentCommand, WireError>> {
        let payload = self.subscription.recv().await?;
        Some(AgentCommand::decode(&payload))
    }

    /// Returns every command already buffered.
    pub fn drain(&mut self) -> Vec<Result<AgentCommand, WireError>> {
        std::iter::from_fn(|| self.subscription.try_recv())
            .map(|payload| AgentCommand::decode(&payload))
            .collect()
    }
}
