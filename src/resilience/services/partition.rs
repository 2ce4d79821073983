//! Network partition detection and recovery deadline.

use super::ResilienceResult;
use crate::bus::ports::CommandBus;
use crate::clock::is_older_than;
use crate::config::TimeoutConfig;
use crate::fleet::{
    domain::{Agent, AgentStatus},
    ports::AgentRegistry,
};
use crate::reconcile::domain::HeartbeatCache;
use crate::stream::{
    domain::StreamStatus,
    ports::{StreamRepository, WaitQueue},
    services::StreamLifecycleService,
};
use crate::telemetry::ESCALATION;
use mockable::Clock;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one partition check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionReport {
    /// Agents newly marked partitioned.
    pub partitioned: usize,
    /// Partitioned agents given up on.
    pub failed: usize,
    /// Streams requeued from failed agents.
    pub requeued: usize,
}

/// Marks silent agents partitioned and fails those that never come back.
pub struct PartitionMonitor<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    agents: Arc<A>,
    lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
    cache: Arc<HeartbeatCache>,
    timeouts: TimeoutConfig,
    clock: Arc<C>,
}

impl<A, S, Q, B, C> PartitionMonitor<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    /// Creates a new monitor.
    #[must_use]
    pub const fn new(
        agents: Arc<A>,
        lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
        cache: Arc<HeartbeatCache>,
        timeouts: TimeoutConfig,
        clock: Arc<C>,
    ) -> Self {
        Self {
            agents,
            lifecycle,
            cache,
            timeouts,
            clock,
        }
    }

    /// Runs one check.
    ///
    /// Active agents silent past the partition window become
    /// `Partitioned` along with their running streams, whose slots are
    /// released. Agents partitioned longer than the recovery window become
    /// `Failed`; their partitioned streams are requeued.
    ///
    /// # Errors
    ///
    /// Returns [`super::ResilienceError`] when the registry cannot be
    /// listed. Per-agent failures are logged and skipped.
    pub async fn check(&self) -> ResilienceResult<PartitionReport> {
        let now = self.clock.utc();
        let mut report = PartitionReport::default();

        for agent in self.agents.list_by_status(AgentStatus::Active).await? {
            if !is_older_than(agent.last_seen_at(), self.timeouts.partition_after(), now) {
                continue;
            }
            match self.partition(&agent).await {
                Ok(true) => report.partitioned += 1,
                Ok(false) => {}
                Err(err) => warn!(agent_id = %agent.id(), error = %err, "partition handling failed"),
            }
        }

        for agent in self.agents.list_by_status(AgentStatus::Partitioned).await? {
            if !is_older_than(agent.status_changed_at(), self.timeouts.partition_recovery(), now) {
                continue;
            }
            match self.give_up(&agent).await {
                Ok(Some(requeued)) => {
                    report.failed += 1;
                    report.requeued += requeued;
                }
                Ok(None) => {}
                Err(err) => warn!(agent_id = %agent.id(), error = %err, "partition recovery failed"),
            }
        }

        if report.requeued > 0 {
            self.lifecycle.drain_queue().await?;
        }
        Ok(report)
    }

    async fn partition(&self, agent: &Agent) -> ResilienceResult<bool> {
        let moved = self
            .agents
            .transition_status(
                agent.id(),
                &[AgentStatus::Active],
                AgentStatus::Partitioned,
                self.clock.utc(),
            )
            .await?;
        if !moved {
            return Ok(false);
        }
        let mut streams = 0;
        for stream in self.lifecycle.streams().list_by_agent(agent.id()).await? {
            if !stream.status().counts_against_agent() {
                continue;
            }
            let result = self
                .lifecycle
                .correct(stream.id(), |current, at| {
                    if current.status().counts_against_agent() {
                        current.mark_partitioned(at)?;
                    }
                    Ok(())
                })
                .await;
            match result {
                Ok(_) => streams += 1,
                Err(err) => warn!(stream_id = %stream.id(), error = %err, "could not mark stream partitioned"),
            }
        }
        warn!(
            agent_id = %agent.id(),
            last_seen = %agent.last_seen_at(),
            streams,
            "agent partitioned"
        );
        Ok(true)
    }

    async fn give_up(&self, agent: &Agent) -> ResilienceResult<Option<usize>> {
        let failed = self
            .agents
            .transition_status(
                agent.id(),
                &[AgentStatus::Partitioned],
                AgentStatus::Failed,
                self.clock.utc(),
            )
            .await?;
        if !failed {
            return Ok(None);
        }
        self.cache.forget(agent.id());
        let mut requeued = 0;
        for stream in self.lifecycle.streams().list_by_agent(agent.id()).await? {
            if stream.status() != StreamStatus::Partitioned {
                continue;
            }
            match self.lifecycle.requeue(stream.id(), "agent partition did not heal").await {
                Ok(_) => requeued += 1,
                Err(err) => warn!(stream_id = %stream.id(), error = %err, "could not requeue stream"),
            }
        }
        warn!(
            target: ESCALATION,
            agent_id = %agent.id(),
            name = %agent.name(),
            requeued,
            "partitioned agent did not recover; marked failed"
        );
        info!(agent_id = %agent.id(), requeued, "partitioned streams requeued");
        Ok(Some(requeued))
    }
}
