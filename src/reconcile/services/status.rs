//! Status event handling, crash restarts and endpoint failover.

use super::ReconcileResult;
use crate::bus::{
    domain::{AgentCommand, ReportedStatus, StatusEvent},
    ports::CommandBus,
};
use crate::fleet::ports::AgentRegistry;
use crate::resilience::{
    domain::{DisableReason, ErrorClass, RestartDecision, RestartPolicy},
    ports::EntitlementCheck,
    services::CircuitBreakerService,
};
use crate::stream::{
    domain::{Stream, StreamStatus},
    ports::{StreamRepository, WaitQueue},
    services::StreamLifecycleService,
};
use crate::telemetry::ESCALATION;
use mockable::Clock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one status event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Unknown stream, foreign agent or a report with nothing to change.
    Ignored,
    /// The stream record was updated.
    Applied,
    /// A start finished after a stop was requested; STOP was sent again.
    StopReissued,
    /// The crashed stream was started again.
    Restarted,
    /// The crashed stream was moved to a substitute endpoint and started.
    FailedOver,
    /// The crashed stream stays in `Error`.
    Held,
    /// The crashed stream's schedule was turned off.
    Disabled(DisableReason),
}

/// Applies agent status events to stream records.
pub struct StatusEventHandler<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
    circuit: CircuitBreakerService<C>,
    policy: RestartPolicy,
    entitlements: Arc<dyn EntitlementCheck>,
    clock: Arc<C>,
}

impl<A, S, Q, B, C> StatusEventHandler<A, S, Q, B, C>
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
        lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
        circuit: CircuitBreakerService<C>,
        policy: RestartPolicy,
        entitlements: Arc<dyn EntitlementCheck>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            lifecycle,
            circuit,
            policy,
            entitlements,
            clock,
        }
    }

    /// Applies one status event.
    ///
    /// Events about unknown streams, or from an agent the stream is not
    /// bound to, are ignored. Repeated deliveries leave the record as the
    /// first delivery did.
    ///
    /// # Errors
    ///
    /// Returns [`super::ReconcileError`] when a store fails or a restart
    /// cannot be issued.
    pub async fn handle(&self, event: &StatusEvent) -> ReconcileResult<StatusOutcome> {
        let Some(stream) = self.lifecycle.streams().find_by_id(event.stream_id).await? else {
            debug!(stream_id = %event.stream_id, "status for unknown stream ignored");
            return Ok(StatusOutcome::Ignored);
        };
        if stream.assigned_agent() != Some(event.vps_id) {
            debug!(
                stream_id = %event.stream_id,
                agent_id = %event.vps_id,
                reported = ?event.status,
                "status from an agent the stream is not bound to ignored"
            );
            return Ok(StatusOutcome::Ignored);
        }

        match event.status {
            ReportedStatus::Starting => self.on_starting(&stream).await,
            ReportedStatus::Streaming => self.on_streaming(&stream).await,
            ReportedStatus::Progress => {
                self.on_progress(&stream, event.extra_data.progress_data.clone())
                    .await
            }
            ReportedStatus::Stopped => self.on_stopped(&stream).await,
            ReportedStatus::Error | ReportedStatus::Dead => self.on_crash(&stream, event).await,
        }
    }

    async fn on_starting(&self, stream: &Stream) -> ReconcileResult<StatusOutcome> {
        if stream.status() != StreamStatus::Starting {
            return Ok(StatusOutcome::Ignored);
        }
        self.lifecycle
            .correct(stream.id(), |record, at| {
                record.touch_liveness(at);
                Ok(())
            })
            .await?;
        Ok(StatusOutcome::Applied)
    }

    async fn on_streaming(&self, stream: &Stream) -> ReconcileResult<StatusOutcome> {
        match stream.status() {
            StreamStatus::Stopping => {
                if let Some(agent) = stream.assigned_agent() {
                    self.lifecycle
                        .send_or_log(agent, &AgentCommand::stop(stream.id()))
                        .await;
                }
                info!(stream_id = %stream.id(), "relay came up after stop; STOP reissued");
                Ok(StatusOutcome::StopReissued)
            }
            StreamStatus::Starting | StreamStatus::Streaming | StreamStatus::Partitioned => {
                self.lifecycle
                    .correct(stream.id(), |record, at| {
                        if matches!(
                            record.status(),
                            StreamStatus::Starting | StreamStatus::Streaming | StreamStatus::Partitioned
                        ) {
                            record.mark_streaming(at)?;
                        }
                        Ok(())
                    })
                    .await?;
                if let Err(err) = self.circuit.record_success(stream.primary_target()).await {
                    warn!(stream_id = %stream.id(), error = %err, "circuit success not recorded");
                }
                if stream.status() != StreamStatus::Streaming {
                    info!(stream_id = %stream.id(), "stream is live");
                }
                Ok(StatusOutcome::Applied)
            }
            _ => Ok(StatusOutcome::Ignored),
        }
    }

    async fn on_progress(&self, stream: &Stream, progress: Option<Value>) -> ReconcileResult<StatusOutcome> {
        if !stream.status().is_running() {
            return Ok(StatusOutcome::Ignored);
        }
        self.lifecycle
            .correct(stream.id(), |record, at| {
                match progress.clone() {
                    Some(data) => record.record_progress(data, at),
                    None => record.touch_liveness(at),
                }
                Ok(())
            })
            .await?;
        Ok(StatusOutcome::Applied)
    }

    async fn on_stopped(&self, stream: &Stream) -> ReconcileResult<StatusOutcome> {
        let stoppable = stream.status().counts_against_agent() || stream.status() == StreamStatus::Partitioned;
        if !stoppable {
            return Ok(StatusOutcome::Ignored);
        }
        self.lifecycle
            .correct(stream.id(), |record, at| {
                if record.assigned_agent().is_some() {
                    record.mark_inactive(at)?;
                }
                Ok(())
            })
            .await?;
        info!(stream_id = %stream.id(), "stream stopped");
        Ok(StatusOutcome::Applied)
    }

    async fn on_crash(&self, stream: &Stream, event: &StatusEvent) -> ReconcileResult<StatusOutcome> {
        if stream.status() == StreamStatus::Stopping {
            return self.on_stopped(stream).await;
        }
        if !stream.status().is_running() && stream.status() != StreamStatus::Partitioned {
            return Ok(StatusOutcome::Ignored);
        }
        let message = if event.message.trim().is_empty() {
            match event.status {
                ReportedStatus::Dead => "relay gave up retrying".to_owned(),
                _ => "relay failed".to_owned(),
            }
        } else {
            event.message.clone()
        };
        let class = ErrorClass::classify(&message);
        let target = stream.primary_target().clone();
        if class == ErrorClass::Endpoint {
            self.circuit.record_failure(&target).await?;
        }

        let agent = event.vps_id;
        let window = self.policy.crash_window();
        let crashed = self
            .lifecycle
            .correct(stream.id(), |record, at| {
                if record.assigned_agent() == Some(agent) {
                    record.record_crash(at, window);
                    record.mark_error(message.as_str(), at)?;
                }
                Ok(())
            })
            .await?;
        warn!(
            stream_id = %stream.id(),
            agent_id = %agent,
            error = %message,
            class = ?class,
            crashes = crashed.recent_crashes().len(),
            "relay crashed"
        );

        let entitled = match self.entitlements.is_entitled(crashed.owner()).await {
            Ok(entitled) => entitled,
            Err(err) => {
                warn!(stream_id = %stream.id(), error = %err, "entitlement unknown; assuming entitled");
                true
            }
        };
        match self.policy.decide(&crashed, class, entitled, self.clock.utc()) {
            RestartDecision::Hold => Ok(StatusOutcome::Held),
            RestartDecision::Disable(reason) => self.disable(&crashed, reason).await,
            RestartDecision::Restart => self.restart(&crashed).await,
        }
    }

    async fn disable(&self, stream: &Stream, reason: DisableReason) -> ReconcileResult<StatusOutcome> {
        self.lifecycle.set_schedule(stream.id(), false).await?;
        warn!(
            target: ESCALATION,
            stream_id = %stream.id(),
            owner = %stream.owner(),
            reason = %reason,
            "stream disabled after crash"
        );
        Ok(StatusOutcome::Disabled(reason))
    }

    async fn restart(&self, stream: &Stream) -> ReconcileResult<StatusOutcome> {
        let target = stream.primary_target();
        if self.circuit.allows(target).await? {
            self.lifecycle.start(stream.id()).await?;
            info!(stream_id = %stream.id(), "crashed stream restarted");
            return Ok(StatusOutcome::Restarted);
        }
        let Some(substitute) = self.circuit.alternative_for(target).await? else {
            info!(stream_id = %stream.id(), endpoint = %target, "endpoint circuit open; restart held");
            return Ok(StatusOutcome::Held);
        };
        self.lifecycle
            .correct(stream.id(), |record, at| {
                record.replace_primary_target(substitute.clone(), at);
                Ok(())
            })
            .await?;
        self.lifecycle.start(stream.id()).await?;
        info!(stream_id = %stream.id(), from = %target, to = %substitute, "stream failed over to substitute endpoint");
        Ok(StatusOutcome::FailedOver)
    }
}
