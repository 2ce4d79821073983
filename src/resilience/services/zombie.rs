//! Cleanup of relays nobody expects and of streams stranded on dead agents.

use super::ResilienceResult;
use crate::bus::{
    domain::{AgentCommand, ZombieSweep},
    ports::CommandBus,
};
use crate::fleet::{
    domain::{Agent, AgentStatus},
    ports::AgentRegistry,
};
use crate::reconcile::domain::{HeartbeatCache, ReportedStream, classify_reported};
use crate::stream::{
    domain::{StreamId, StreamStatus},
    ports::{StreamRepository, WaitQueue},
    services::StreamLifecycleService,
};
use mockable::Clock;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one reaping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Relays the agents were told to kill.
    pub zombies: usize,
    /// Streams moved off dead agents.
    pub reassigned: usize,
}

/// Compares what agents run with what they should run.
pub struct ZombieReaper<A, S, Q, B, C>
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
    clock: Arc<C>,
}

impl<A, S, Q, B, C> ZombieReaper<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    /// Creates a new reaper.
    #[must_use]
    pub const fn new(
        agents: Arc<A>,
        lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
        cache: Arc<HeartbeatCache>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            agents,
            lifecycle,
            cache,
            clock,
        }
    }

    /// Runs one pass over every agent.
    ///
    /// Active agents with a fresh cached report are told to kill relays
    /// they should not run. Streams still bound to failed agents are
    /// requeued and the queue is drained.
    ///
    /// # Errors
    ///
    /// Returns [`super::ResilienceError`] when the registry cannot be
    /// listed. Per-agent failures are logged and skipped.
    pub async fn reap(&self) -> ResilienceResult<ReapReport> {
        let mut report = ReapReport::default();
        for agent in self.agents.list_all().await? {
            if agent.status() == AgentStatus::Failed {
                match self.reassign_from(&agent).await {
                    Ok(moved) => report.reassigned += moved,
                    Err(err) => warn!(agent_id = %agent.id(), error = %err, "could not reassign streams of dead agent"),
                }
            } else if agent.status() == AgentStatus::Active {
                match self.kill_zombies_on(&agent).await {
                    Ok(killed) => report.zombies += killed,
                    Err(err) => warn!(agent_id = %agent.id(), error = %err, "zombie check failed for agent"),
                }
            }
        }
        if report.reassigned > 0 {
            self.lifecycle.drain_queue().await?;
        }
        Ok(report)
    }

    async fn kill_zombies_on(&self, agent: &Agent) -> ResilienceResult<usize> {
        let Some(reported) = self.cache.reported(agent.id(), self.clock.utc()) else {
            return Ok(0);
        };
        let mut zombies: Vec<StreamId> = Vec::new();
        for id in reported {
            let stream = self.lifecycle.streams().find_by_id(id).await?;
            if classify_reported(stream.as_ref(), agent.id()) == ReportedStream::Zombie {
                zombies.push(id);
            }
        }
        if zombies.is_empty() {
            return Ok(0);
        }
        let count = zombies.len();
        let command = AgentCommand::CleanupZombies(ZombieSweep {
            stream_ids: zombies,
        });
        if self.lifecycle.send_or_log(agent.id(), &command).await {
            info!(agent_id = %agent.id(), count, "zombie relays cleanup requested");
        }
        Ok(count)
    }

    async fn reassign_from(&self, agent: &Agent) -> ResilienceResult<usize> {
        let mut moved = 0;
        for stream in self.lifecycle.streams().list_by_agent(agent.id()).await? {
            let result = match stream.status() {
                StreamStatus::Stopping => self
                    .lifecycle
                    .correct(stream.id(), |current, at| {
                        if current.status() == StreamStatus::Stopping {
                            current.mark_inactive(at)?;
                        }
                        Ok(())
                    })
                    .await
                    .map(|_| ()),
                StreamStatus::Starting | StreamStatus::Streaming | StreamStatus::Partitioned => {
                    moved += 1;
                    self.lifecycle
                        .requeue(stream.id(), "assigned agent is dead")
                        .await
                        .map(|_| ())
                }
                _ => Ok(()),
            };
            if let Err(err) = result {
                warn!(stream_id = %stream.id(), agent_id = %agent.id(), error = %err, "could not move stream off dead agent");
            }
        }
        if moved > 0 {
            info!(agent_id = %agent.id(), moved, "streams moved off dead agent");
        }
        Ok(moved)
    }
}
