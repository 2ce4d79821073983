//! Periodic correction of streams and agents stuck in transient states.

use super::ReconcileResult;
use crate::bus::ports::CommandBus;
use crate::clock::is_older_than;
use crate::config::TimeoutConfig;
use crate::fleet::{
    domain::{Agent, AgentId, AgentStatus},
    ports::AgentRegistry,
};
use crate::stream::{
    domain::{Stream, StreamStatus},
    ports::{StreamRepository, WaitQueue},
    services::StreamLifecycleService,
};
use crate::telemetry::ESCALATION;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts of corrections made by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// `Starting` streams that never confirmed.
    pub start_timeouts: usize,
    /// `Stopping` streams that never confirmed.
    pub stop_timeouts: usize,
    /// `Streaming` streams that went quiet.
    pub silent: usize,
    /// Running streams whose agent is gone or dead.
    pub orphaned: usize,
    /// Agents failed for overrunning an update.
    pub updates_failed: usize,
}

impl SweepReport {
    /// Returns the number of stream corrections.
    #[must_use]
    pub const fn streams_corrected(&self) -> usize {
        self.start_timeouts + self.stop_timeouts + self.silent + self.orphaned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stuck {
    StartTimeout,
    StopTimeout,
    Silent,
    Orphaned,
}

/// Corrects streams and agents whose confirmations never arrived.
pub struct TransientSweeper<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    agents: Arc<A>,
    lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
    timeouts: TimeoutConfig,
    clock: Arc<C>,
}

impl<A, S, Q, B, C> TransientSweeper<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    /// Creates a new sweeper.
    #[must_use]
    pub const fn new(
        agents: Arc<A>,
        lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
        timeouts: TimeoutConfig,
        clock: Arc<C>,
    ) -> Self {
        Self {
            agents,
            lifecycle,
            timeouts,
            clock,
        }
    }

    /// Runs one sweep.
    ///
    /// Each correction re-checks its condition against the latest record,
    /// so a confirmation that lands mid-sweep wins. Slots are released by
    /// the corrections themselves.
    ///
    /// # Errors
    ///
    /// Returns [`super::ReconcileError`] when the stores cannot be listed.
    /// Failures correcting a single stream are logged and skipped.
    pub async fn sweep(&self) -> ReconcileResult<SweepReport> {
        let now = self.clock.utc();
        let mut report = SweepReport::default();
        let agents: HashMap<AgentId, Agent> = self
            .agents
            .list_all()
            .await?
            .into_iter()
            .map(|agent| (agent.id(), agent))
            .collect();

        let mut candidates = Vec::new();
        for status in [StreamStatus::Starting, StreamStatus::Stopping, StreamStatus::Streaming] {
            candidates.extend(self.lifecycle.streams().list_by_status(status).await?);
        }

        for stream in candidates {
            let Some(stuck) = self.diagnose(&stream, &agents, now) else {
                continue;
            };
            match self.correct(&stream, stuck, &agents).await {
                Ok(true) => match stuck {
                    Stuck::StartTimeout => report.start_timeouts += 1,
                    Stuck::StopTimeout => report.stop_timeouts += 1,
                    Stuck::Silent => report.silent += 1,
                    Stuck::Orphaned => report.orphaned += 1,
                },
                Ok(false) => debug!(stream_id = %stream.id(), "stream resolved before correction"),
                Err(err) => warn!(stream_id = %stream.id(), error = %err, "sweep correction failed"),
            }
        }

        for agent in agents.values().filter(|agent| agent.status().is_updating()) {
            if !is_older_than(agent.status_changed_at(), self.timeouts.update_ceiling(), now) {
                continue;
            }
            let failed = self
                .agents
                .transition_status(
                    agent.id(),
                    &[AgentStatus::PreparingUpdate, AgentStatus::Updating],
                    AgentStatus::Failed,
                    now,
                )
                .await?;
            if failed {
                report.updates_failed += 1;
                warn!(
                    target: ESCALATION,
                    agent_id = %agent.id(),
                    name = %agent.name(),
                    status = %agent.status(),
                    "agent update overran its ceiling; marked failed"
                );
            }
        }

        if report.streams_corrected() > 0 {
            debug!(?report, "sweep corrected streams");
        }
        Ok(report)
    }

    fn diagnose(
        &self,
        stream: &Stream,
        agents: &HashMap<AgentId, Agent>,
        now: DateTime<Utc>,
    ) -> Option<Stuck> {
        if stream.start_timed_out(self.timeouts.starting(), now) {
            return Some(Stuck::StartTimeout);
        }
        if stream.stop_timed_out(self.timeouts.stopping(), now) {
            return Some(Stuck::StopTimeout);
        }
        if stream.is_silent(self.timeouts.streaming_silence(), now) {
            return Some(Stuck::Silent);
        }
        if stream.status().is_running() && self.agent_is_dead(stream.assigned_agent(), agents, now) {
            return Some(Stuck::Orphaned);
        }
        None
    }

    fn agent_is_dead(
        &self,
        agent: Option<AgentId>,
        agents: &HashMap<AgentId, Agent>,
        now: DateTime<Utc>,
    ) -> bool {
        agent
            .and_then(|id| agents.get(&id))
            .is_none_or(|agent| is_older_than(agent.last_seen_at(), self.timeouts.agent_liveness(), now))
    }

    async fn correct(
        &self,
        stream: &Stream,
        stuck: Stuck,
        agents: &HashMap<AgentId, Agent>,
    ) -> ReconcileResult<bool> {
        let mut applied = false;
        self.lifecycle
            .correct(stream.id(), |current, at| {
                applied = false;
                let still_stuck = self.diagnose(current, agents, at) == Some(stuck);
                if !still_stuck {
                    return Ok(());
                }
                match stuck {
                    Stuck::StartTimeout => current.mark_error("agent never confirmed start", at)?,
                    Stuck::StopTimeout => current.mark_inactive(at)?,
                    Stuck::Silent => current.mark_error("relay stopped reporting", at)?,
                    Stuck::Orphaned => current.mark_error("assigned agent is unreachable", at)?,
                }
                applied = true;
                Ok(())
            })
            .await?;
        if applied {
            warn!(stream_id = %stream.id(), from = %stream.status(), reason = ?stuck, "stuck stream corrected");
        }
        Ok(applied)
    }
}
