//! Per-endpoint circuit breaking and failover targets.

use crate::config::CircuitConfig;
use crate::resilience::{
    domain::{CircuitState, CircuitStatus, Endpoint},
    ports::{CircuitStateStore, CircuitStoreResult, EndpointProbe},
};
use crate::stream::domain::RelayTarget;
use mockable::Clock;
use std::sync::Arc;
use tracing::{info, warn};

/// Tracks relay endpoint failures, offers failover targets and probes open
/// circuits back to health.
#[derive(Clone)]
pub struct CircuitBreakerService<C>
where
    C: Clock + Send + Sync,
{
    store: Arc<dyn CircuitStateStore>,
    probe: Arc<dyn EndpointProbe>,
    config: CircuitConfig,
    clock: Arc<C>,
}

impl<C> CircuitBreakerService<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a new circuit breaker.
    #[must_use]
    pub fn new(
        store: Arc<dyn CircuitStateStore>,
        probe: Arc<dyn EndpointProbe>,
        config: CircuitConfig,
        clock: Arc<C>,
    ) -> Self {
        Self {
            store,
            probe,
            config,
            clock,
        }
    }

    /// Counts a failure against the target's endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`crate::resilience::ports::CircuitStoreError`] when the
    /// store fails.
    pub async fn record_failure(&self, target: &RelayTarget) -> CircuitStoreResult<CircuitState> {
        let mut state = self.state_of(Endpoint::of(target)).await?;
        let tripped = state.record_failure(
            self.config.failure_threshold,
            self.config.open_duration(),
            self.clock.utc(),
        );
        self.store.put(&state).await?;
        if tripped {
            warn!(
                endpoint = %state.endpoint(),
                failures = state.failures(),
                retry_at = ?state.retry_at(),
                "circuit opened"
            );
        }
        Ok(state)
    }

    /// Closes the target's circuit after a successful relay.
    ///
    /// # Errors
    ///
    /// Returns [`crate::resilience::ports::CircuitStoreError`] when the
    /// store fails.
    pub async fn record_success(&self, target: &RelayTarget) -> CircuitStoreResult<()> {
        let Some(mut state) = self.store.get(&Endpoint::of(target)).await? else {
            return Ok(());
        };
        if state.status() == CircuitStatus::Closed && state.failures() == 0 {
            return Ok(());
        }
        state.record_success();
        self.store.put(&state).await?;
        info!(endpoint = %state.endpoint(), "circuit closed");
        Ok(())
    }

    /// Returns whether relays to `target` may be attempted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::resilience::ports::CircuitStoreError`] when the
    /// store fails.
    pub async fn allows(&self, target: &RelayTarget) -> CircuitStoreResult<bool> {
        Ok(self.state_of(Endpoint::of(target)).await?.allows())
    }

    /// Finds a substitute for `target` among its configured fallback group
    /// whose circuit is closed. The stream key path is kept.
    ///
    /// # Errors
    ///
    /// Returns [`crate::resilience::ports::CircuitStoreError`] when the
    /// store fails.
    pub async fn alternative_for(&self, target: &RelayTarget) -> CircuitStoreResult<Option<RelayTarget>> {
        for group in &self.config.fallback_groups {
            let Some(base) = group.iter().find(|base| target.as_str().starts_with(base.as_str())) else {
                continue;
            };
            for other in group.iter().filter(|other| *other != base) {
                let Some(candidate) = target.rebase(base, other) else {
                    continue;
                };
                if self.allows(&candidate).await? {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    /// Probes every open circuit whose retry deadline passed. Reachable
    /// endpoints close; unreachable ones reopen with a new deadline.
    ///
    /// Returns the number of circuits closed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::resilience::ports::CircuitStoreError`] when the
    /// store fails.
    pub async fn probe(&self) -> CircuitStoreResult<usize> {
        let now = self.clock.utc();
        let mut closed = 0;
        for mut state in self.store.list().await? {
            if !state.probe_due(now) {
                continue;
            }
            state.begin_probe();
            self.store.put(&state).await?;
            if self.probe.probe(state.endpoint()).await {
                state.record_success();
                closed += 1;
                info!(endpoint = %state.endpoint(), "probe succeeded; circuit closed");
            } else {
                state.record_failure(
                    self.config.failure_threshold,
                    self.config.open_duration(),
                    self.clock.utc(),
                );
                info!(endpoint = %state.endpoint(), retry_at = ?state.retry_at(), "probe failed; circuit reopened");
            }
            self.store.put(&state).await?;
        }
        Ok(closed)
    }

    async fn state_of(&self, endpoint: Endpoint) -> CircuitStoreResult<CircuitState> {
        Ok(self
            .store
            .get(&endpoint)
            .await?
            .unwrap_or_else(|| CircuitState::closed(endpoint)))
    }
}
