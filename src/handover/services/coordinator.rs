//! Drain, update and verify one agent.

use crate::bus::ports::CommandBus;
use crate::config::{IntervalConfig, TimeoutConfig};
use crate::fleet::{
    domain::{Agent, AgentId, AgentStatus},
    ports::{AgentRegistry, AgentRegistryError},
};
use crate::handover::ports::{AgentDeployer, DeployError};
use crate::reconcile::domain::HeartbeatCache;
use crate::stream::{
    ports::{StreamRepository, StreamRepositoryError, WaitQueue},
    services::{LifecycleError, StreamLifecycleService},
};
use crate::telemetry::ESCALATION;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors returned by [`AgentUpdateCoordinator::upgrade`].
#[derive(Debug, Error)]
pub enum UpdateError {
    /// No such agent.
    #[error("agent {0} not found")]
    NotFound(AgentId),
    /// Only active agents can be updated.
    #[error("agent {agent} is {status}; only active agents can be updated")]
    NotActive {
        /// The agent.
        agent: AgentId,
        /// Its status.
        status: AgentStatus,
    },
    /// The rest of the fleet cannot absorb the agent's streams.
    #[error("agent {agent} runs {needed} streams but only {spare} slots are free elsewhere")]
    InsufficientCapacity {
        /// The agent.
        agent: AgentId,
        /// Streams to hand over.
        needed: u32,
        /// Free slots on other active agents.
        spare: u32,
    },
    /// Another actor moved the agent out of its update status.
    #[error("agent {agent} left the update unexpectedly")]
    Interrupted {
        /// The agent.
        agent: AgentId,
    },
    /// A rollout step failed; the agent was rolled back and marked failed.
    #[error(transparent)]
    Deploy(#[from] DeployError),
    /// The new software did not heartbeat or failed its self-check; the
    /// agent was rolled back and marked failed.
    #[error("agent {agent} failed verification of version {version}")]
    VerificationFailed {
        /// The agent.
        agent: AgentId,
        /// The rejected version.
        version: String,
    },
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] AgentRegistryError),
    /// Stream lookup failed.
    #[error(transparent)]
    Streams(#[from] StreamRepositoryError),
    /// A stream could not be handed over.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Result type for update operations.
pub type UpdateResult<T> = Result<T, UpdateError>;

/// Summary of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Streams moved to other agents.
    pub handed_over: usize,
    /// Streams that could not be moved and were cut by the update.
    pub left_behind: usize,
    /// Whether the agent reported zero streams before the drain timeout.
    pub drained: bool,
    /// The version now running.
    pub version: String,
}

/// Updates agents one at a time without dropping their streams.
pub struct AgentUpdateCoordinator<A, S, Q, B, C>
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
    deployer: Arc<dyn AgentDeployer>,
    timeouts: TimeoutConfig,
    poll: Duration,
    clock: Arc<C>,
}

impl<A, S, Q, B, C> AgentUpdateCoordinator<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    /// Creates a new coordinator.
    #[must_use]
    pub fn new(
        agents: Arc<A>,
        lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
        cache: Arc<HeartbeatCache>,
        deployer: Arc<dyn AgentDeployer>,
        timeouts: TimeoutConfig,
        intervals: &IntervalConfig,
        clock: Arc<C>,
    ) -> Self {
        Self {
            agents,
            lifecycle,
            cache,
            deployer,
            timeouts,
            poll: intervals.handover_poll(),
            clock,
        }
    }

    /// Updates `agent` to `version`.
    ///
    /// The agent leaves the pool (`PreparingUpdate`), hands its running
    /// streams to other agents, waits until it reports none (or the drain
    /// timeout passes), then moves to `Updating` for the rollout. A fresh
    /// heartbeat and a passing self-check return it to `Active` with the
    /// new version. The agent always ends `Active` or `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::NotActive`] or
    /// [`UpdateError::InsufficientCapacity`] without touching the agent's
    /// streams. Rollout and verification failures roll back, mark the
    /// agent `Failed` and return the cause.
    pub async fn upgrade(&self, agent_id: AgentId, version: &str) -> UpdateResult<UpgradeReport> {
        let agent = self
            .agents
            .find_by_id(agent_id)
            .await?
            .ok_or(UpdateError::NotFound(agent_id))?;
        let entered = self
            .agents
            .transition_status(
                agent_id,
                &[AgentStatus::Active],
                AgentStatus::PreparingUpdate,
                self.clock.utc(),
            )
            .await?;
        if !entered {
            return Err(UpdateError::NotActive {
                agent: agent_id,
                status: agent.status(),
            });
        }
        info!(agent_id = %agent_id, version, "agent update started");

        let (handed_over, left_behind) = match self.hand_over_all(agent_id).await {
            Ok(moved) => moved,
            Err(err) => {
                self.abort(agent_id).await;
                return Err(err);
            }
        };
        let drained = self.wait_for_drain(agent_id).await;
        if !drained {
            warn!(agent_id = %agent_id, "agent still reports streams after the drain timeout");
        }

        let updating = self
            .agents
            .transition_status(
                agent_id,
                &[AgentStatus::PreparingUpdate],
                AgentStatus::Updating,
                self.clock.utc(),
            )
            .await?;
        if !updating {
            return Err(UpdateError::Interrupted { agent: agent_id });
        }

        match self.roll_out(&agent, version).await {
            Ok(()) => {
                let now = self.clock.utc();
                self.agents.set_software_version(agent_id, version, now).await?;
                let back = self
                    .agents
                    .transition_status(agent_id, &[AgentStatus::Updating], AgentStatus::Active, now)
                    .await?;
                if !back {
                    return Err(UpdateError::Interrupted { agent: agent_id });
                }
                self.lifecycle.drain_signal().raise();
                info!(agent_id = %agent_id, version, handed_over, "agent updated");
                Ok(UpgradeReport {
                    handed_over,
                    left_behind,
                    drained,
                    version: version.to_owned(),
                })
            }
            Err(err) => {
                self.fail(&agent, version, &err).await;
                Err(err)
            }
        }
    }

    async fn hand_over_all(&self, agent_id: AgentId) -> UpdateResult<(usize, usize)> {
        let running: Vec<_> = self
            .lifecycle
            .streams()
            .list_by_agent(agent_id)
            .await?
            .into_iter()
            .filter(|stream| stream.status().is_running())
            .collect();
        let needed = u32::try_from(running.len()).unwrap_or(u32::MAX);
        let spare = self
            .lifecycle
            .allocator()
            .spare_capacity(Some(agent_id))
            .await
            .map_err(LifecycleError::from)?;
        if spare < needed {
            return Err(UpdateError::InsufficientCapacity {
                agent: agent_id,
                needed,
                spare,
            });
        }

        let mut handed_over = 0;
        let mut left_behind = 0;
        for stream in running {
            match self.lifecycle.hand_over(stream.id(), agent_id).await {
                Ok(Some(_)) => handed_over += 1,
                Ok(None) => left_behind += 1,
                Err(err) => {
                    left_behind += 1;
                    warn!(stream_id = %stream.id(), agent_id = %agent_id, error = %err, "stream handover failed");
                }
            }
        }
        Ok((handed_over, left_behind))
    }

    /// Polls the heartbeat cache until the agent reports no streams.
    async fn wait_for_drain(&self, agent_id: AgentId) -> bool {
        let since = self.clock.utc();
        let polling = async {
            loop {
                if self.reports_nothing_since(agent_id, since) {
                    return;
                }
                tokio::time::sleep(self.poll).await;
            }
        };
        tokio::time::timeout(self.timeouts.handover_drain(), polling)
            .await
            .is_ok()
    }

    fn reports_nothing_since(&self, agent_id: AgentId, since: DateTime<Utc>) -> bool {
        let fresh = self.cache.reported_at(agent_id).is_some_and(|at| at >= since);
        fresh
            && self
                .cache
                .reported(agent_id, self.clock.utc())
                .is_some_and(|streams| streams.is_empty())
    }

    async fn roll_out(&self, agent: &Agent, version: &str) -> UpdateResult<()> {
        self.deployer.stop(agent).await?;
        self.deployer.deploy(agent, version).await?;
        self.deployer.start(agent).await?;
        let restarted_at = self.clock.utc();
        if !self.wait_for_heartbeat(agent.id(), restarted_at).await? {
            warn!(agent_id = %agent.id(), version, "no heartbeat from updated agent");
            return Err(UpdateError::VerificationFailed {
                agent: agent.id(),
                version: version.to_owned(),
            });
        }
        if !self.deployer.self_check(agent, version).await? {
            warn!(agent_id = %agent.id(), version, "updated agent failed its self-check");
            return Err(UpdateError::VerificationFailed {
                agent: agent.id(),
                version: version.to_owned(),
            });
        }
        Ok(())
    }

    async fn wait_for_heartbeat(&self, agent_id: AgentId, after: DateTime<Utc>) -> UpdateResult<bool> {
        let polling = async {
            loop {
                let agent = self.agents.find_by_id(agent_id).await?;
                if agent
                    .and_then(|record| record.last_heartbeat_at())
                    .is_some_and(|at| at > after)
                {
                    return Ok::<_, UpdateError>(());
                }
                tokio::time::sleep(self.poll).await;
            }
        };
        match tokio::time::timeout(self.timeouts.update_verify(), polling).await {
            Ok(result) => result.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    async fn abort(&self, agent_id: AgentId) {
        let restored = self
            .agents
            .transition_status(
                agent_id,
                &[AgentStatus::PreparingUpdate],
                AgentStatus::Active,
                self.clock.utc(),
            )
            .await;
        match restored {
            Ok(_) => info!(agent_id = %agent_id, "agent update aborted; agent active again"),
            Err(err) => warn!(agent_id = %agent_id, error = %err, "could not reactivate agent after aborted update"),
        }
    }

    async fn fail(&self, agent: &Agent, version: &str, cause: &UpdateError) {
        let previous = agent.software_version().map(str::to_owned);
        if let Err(err) = self.deployer.rollback(agent, previous.clone()).await {
            warn!(agent_id = %agent.id(), error = %err, "rollback failed");
        }
        let failed = self
            .agents
            .transition_status(
                agent.id(),
                &[AgentStatus::PreparingUpdate, AgentStatus::Updating],
                AgentStatus::Failed,
                self.clock.utc(),
            )
            .await;
        if let Err(err) = failed {
            warn!(agent_id = %agent.id(), error = %err, "could not mark agent failed");
        }
        warn!(
            target: ESCALATION,
            agent_id = %agent.id(),
            name = %agent.name(),
            version,
            previous = ?previous,
            error = %cause,
            "agent update failed; rolled back and marked failed"
        );
    }
}
