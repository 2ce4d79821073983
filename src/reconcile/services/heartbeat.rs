//! Heartbeat handling.

use super::ReconcileResult;
use crate::bus::{domain::Heartbeat, ports::CommandBus};
use crate::fleet::{
    domain::{AgentId, AgentStatus},
    ports::AgentRegistry,
};
use crate::reconcile::domain::{HeartbeatCache, ReportedStream, classify_reported};
use crate::stream::{
    domain::StreamStatus,
    ports::{StreamRepository, WaitQueue},
    services::StreamLifecycleService,
};
use mockable::Clock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one heartbeat changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    /// The agent came back from a partition.
    pub recovered: bool,
    /// Unbound streams adopted from the agent's report.
    pub reannounced: usize,
    /// Partitioned streams the agent still runs.
    pub restored: usize,
    /// Partitioned streams the agent no longer runs, sent back to the queue.
    pub requeued: usize,
    /// The agent's counted load was corrected.
    pub healed: bool,
}

/// Applies heartbeats to the registry and stream records.
pub struct HeartbeatHandler<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    agents: Arc<A>,
    queue: Arc<Q>,
    lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
    cache: Arc<HeartbeatCache>,
    clock: Arc<C>,
}

impl<A, S, Q, B, C> HeartbeatHandler<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    /// Creates a new handler.
    #[must_use]
    pub const fn new(
        agents: Arc<A>,
        queue: Arc<Q>,
        lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
        cache: Arc<HeartbeatCache>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            agents,
            queue,
            lifecycle,
            cache,
            clock,
        }
    }

    /// Applies one heartbeat.
    ///
    /// Refreshes the agent's liveness and cached report, brings a
    /// partitioned agent back to `Active`, adopts reported streams the
    /// control plane lost track of, restores or requeues the agent's
    /// partitioned streams, and finally sets the agent's counted load to
    /// the number of streams bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`super::ReconcileError`] when the registry or a store
    /// fails. Heartbeats from unknown agents are logged and ignored.
    pub async fn handle(&self, heartbeat: &Heartbeat) -> ReconcileResult<HeartbeatOutcome> {
        let agent_id = heartbeat.vps_id;
        let mut outcome = HeartbeatOutcome::default();
        let Some(agent) = self.agents.find_by_id(agent_id).await? else {
            warn!(agent_id = %agent_id, "heartbeat from unknown agent ignored");
            return Ok(outcome);
        };
        let now = self.clock.utc();
        self.agents.record_heartbeat(agent_id, now).await?;
        self.cache
            .record(agent_id, heartbeat.active_streams.iter().copied(), now);

        if agent.status() == AgentStatus::Partitioned {
            outcome.recovered = self
                .agents
                .transition_status(agent_id, &[AgentStatus::Partitioned], AgentStatus::Active, now)
                .await?;
            if outcome.recovered {
                info!(agent_id = %agent_id, "partitioned agent recovered");
                self.lifecycle.drain_signal().raise();
            }
        }

        let reported: BTreeSet<_> = heartbeat.active_streams.iter().copied().collect();
        for id in &reported {
            let stream = self.lifecycle.streams().find_by_id(*id).await?;
            let Some(current) = stream.as_ref() else {
                continue;
            };
            match (classify_reported(stream.as_ref(), agent_id), current.status()) {
                (ReportedStream::Expected, StreamStatus::Partitioned) => {
                    self.lifecycle
                        .correct(*id, |record, at| {
                            if record.status() == StreamStatus::Partitioned {
                                record.mark_streaming(at)?;
                            }
                            Ok(())
                        })
                        .await?;
                    outcome.restored += 1;
                }
                (ReportedStream::Expected, StreamStatus::Streaming) => {
                    self.lifecycle
                        .correct(*id, |record, at| {
                            record.touch_liveness(at);
                            Ok(())
                        })
                        .await?;
                }
                (ReportedStream::Reannounce, _) => {
                    self.lifecycle
                        .correct(*id, |record, at| {
                            if record.assigned_agent().is_none() {
                                record.reannounce(agent_id, at)?;
                            }
                            Ok(())
                        })
                        .await?;
                    self.queue.remove(*id).await?;
                    outcome.reannounced += 1;
                    info!(stream_id = %id, agent_id = %agent_id, "stream re-announced by agent");
                }
                _ => {}
            }
        }

        for stream in self.lifecycle.streams().list_by_agent(agent_id).await? {
            if stream.status() == StreamStatus::Partitioned && !reported.contains(&stream.id()) {
                self.lifecycle
                    .requeue(stream.id(), "agent recovered without this relay")
                    .await?;
                outcome.requeued += 1;
            }
        }

        outcome.healed = self.heal_count(agent_id, reported.len()).await?;
        Ok(outcome)
    }

    /// Sets the agent's load to its bound streams plus slots claimed by
    /// allocations still saving their binding.
    ///
    /// The ledger is read after the agent and before the count. A claim
    /// made after the agent was read bumps the load and fails the CAS; one
    /// made before is either still held or already bound and counted.
    async fn heal_count(&self, agent_id: AgentId, reported: usize) -> ReconcileResult<bool> {
        let Some(agent) = self.agents.find_by_id(agent_id).await? else {
            return Ok(false);
        };
        let in_flight = self.lifecycle.allocator().in_flight().on(agent_id);
        let bound = self.lifecycle.streams().count_counted_on(agent_id).await?;
        let counted = bound.saturating_add(in_flight);
        if counted > agent.max_streams() {
            warn!(
                agent_id = %agent_id,
                bound,
                in_flight,
                max_streams = agent.max_streams(),
                "agent holds more streams than its capacity"
            );
        }
        if agent.current_streams() == counted {
            return Ok(false);
        }
        let healed = self
            .agents
            .reconcile_stream_count(agent_id, agent.current_streams(), counted, self.clock.utc())
            .await?;
        if healed {
            info!(
                agent_id = %agent_id,
                from = agent.current_streams(),
                to = counted,
                in_flight,
                reported,
                "agent load corrected"
            );
            if counted < agent.current_streams() {
                self.lifecycle.drain_signal().raise();
            }
        } else {
            debug!(agent_id = %agent_id, "agent load changed concurrently; correction skipped");
        }
        Ok(healed)
    }
}
