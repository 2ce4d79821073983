//! Per-shard consumer applying agent events in arrival order.

use super::{HeartbeatHandler, StatusEventHandler};
use crate::bus::{domain::AgentEvent, ports::CommandBus};
use crate::fleet::ports::AgentRegistry;
use crate::stream::ports::{StreamRepository, WaitQueue};
use mockable::Clock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dispatches agent events to the heartbeat and status handlers.
pub struct EventRouter<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    heartbeats: HeartbeatHandler<A, S, Q, B, C>,
    statuses: StatusEventHandler<A, S, Q, B, C>,
}

impl<A, S, Q, B, C> EventRouter<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    /// Creates a new router.
    #[must_use]
    pub const fn new(
        heartbeats: HeartbeatHandler<A, S, Q, B, C>,
        statuses: StatusEventHandler<A, S, Q, B, C>,
    ) -> Self {
        Self { heartbeats, statuses }
    }

    /// Applies one event, logging failures.
    pub async fn handle(&self, event: &AgentEvent) {
        match event {
            AgentEvent::Heartbeat(heartbeat) => match self.heartbeats.handle(heartbeat).await {
                Ok(outcome) => debug!(agent_id = %heartbeat.vps_id, ?outcome, "heartbeat applied"),
                Err(err) => warn!(agent_id = %heartbeat.vps_id, error = %err, "heartbeat not applied"),
            },
            AgentEvent::Status(status) => match self.statuses.handle(status).await {
                Ok(outcome) => debug!(
                    stream_id = %status.stream_id,
                    reported = ?status.status,
                    ?outcome,
                    "status applied"
                ),
                Err(err) => warn!(
                    stream_id = %status.stream_id,
                    reported = ?status.status,
                    error = %err,
                    "status not applied"
                ),
            },
        }
    }

    /// Consumes one shard until it closes or `cancel` fires.
    pub async fn run(
        self: Arc<Self>,
        shard: usize,
        mut events: mpsc::Receiver<AgentEvent>,
        cancel: CancellationToken,
    ) {
        debug!(shard, "reconciliation shard started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(&event).await,
                    None => break,
                },
            }
        }
        info!(shard, "reconciliation shard stopped");
    }
}
