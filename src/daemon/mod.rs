//! Process supervision: the event pump, reconciliation shards and the
//! periodic workers, all sharing one cancellation token.
//!
//! Workers never stop on errors. Every failure is logged and the worker
//! carries on with its next tick.

mod periodic;

use crate::bus::{
    ports::{CommandBus, CommandBusError},
    services::{CommandDispatcher, EventPump},
};
use crate::config::OrchestratorConfig;
use crate::fleet::{ports::AgentRegistry, services::FleetRegistryService};
use crate::handover::{ports::AgentDeployer, services::AgentUpdateCoordinator};
use crate::reconcile::{
    domain::HeartbeatCache,
    services::{EventRouter, HeartbeatHandler, StatusEventHandler, TransientSweeper},
};
use crate::resilience::{
    domain::RestartPolicy,
    ports::{CircuitStateStore, EndpointProbe, EntitlementCheck},
    services::{CircuitBreakerService, PartitionMonitor, ZombieReaper},
};
use crate::signal::DrainSignal;
use crate::stream::{
    ports::{StreamRepository, WaitQueue},
    services::StreamLifecycleService,
};
use mockable::Clock;
use periodic::spawn_periodic;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External collaborators the control plane consults.
#[derive(Clone)]
pub struct Collaborators {
    /// Where circuit states live.
    pub circuits: Arc<dyn CircuitStateStore>,
    /// Reachability check for open circuits.
    pub probe: Arc<dyn EndpointProbe>,
    /// Billing lookup consulted before crash restarts.
    pub entitlements: Arc<dyn EntitlementCheck>,
}

/// The assembled control plane, ready to start.
pub struct Daemon<A, S, Q, B, C>
where
    A: AgentRegistry + 'static,
    S: StreamRepository + 'static,
    Q: WaitQueue + 'static,
    B: CommandBus + 'static,
    C: Clock + Send + Sync + 'static,
{
    config: OrchestratorConfig,
    agents: Arc<A>,
    queue: Arc<Q>,
    bus: Arc<B>,
    clock: Arc<C>,
    lifecycle: Arc<StreamLifecycleService<A, S, Q, B, C>>,
    cache: Arc<HeartbeatCache>,
    drain: DrainSignal,
    collaborators: Collaborators,
}

impl<A, S, Q, B, C> Daemon<A, S, Q, B, C>
where
    A: AgentRegistry + 'static,
    S: StreamRepository + 'static,
    Q: WaitQueue + 'static,
    B: CommandBus + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Wires the services over the given stores.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        agents: Arc<A>,
        streams: Arc<S>,
        queue: Arc<Q>,
        bus: Arc<B>,
        clock: Arc<C>,
        collaborators: Collaborators,
    ) -> Self {
        let drain = DrainSignal::new();
        let lifecycle = Arc::new(StreamLifecycleService::new(
            Arc::clone(&agents),
            streams,
            Arc::clone(&queue),
            CommandDispatcher::new(Arc::clone(&bus), &config.dispatch),
            Arc::clone(&clock),
            drain.clone(),
        ));
        let cache = Arc::new(HeartbeatCache::new(config.reconcile.heartbeat_cache_ttl()));
        Self {
            config,
            agents,
            queue,
            bus,
            clock,
            lifecycle,
            cache,
            drain,
            collaborators,
        }
    }

    /// Returns the lifecycle service for user-facing commands.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<StreamLifecycleService<A, S, Q, B, C>> {
        &self.lifecycle
    }

    /// Builds the registry service used to enrol and retire agents.
    #[must_use]
    pub fn fleet(&self) -> FleetRegistryService<A, C> {
        FleetRegistryService::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.clock),
            self.drain.clone(),
        )
    }

    /// Builds an update coordinator that rolls software out through
    /// `deployer`.
    #[must_use]
    pub fn update_coordinator(
        &self,
        deployer: Arc<dyn AgentDeployer>,
    ) -> AgentUpdateCoordinator<A, S, Q, B, C> {
        AgentUpdateCoordinator::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.cache),
            deployer,
            self.config.timeouts.clone(),
            &self.config.intervals,
            Arc::clone(&self.clock),
        )
    }

    /// Subscribes to agent events and spawns every worker.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the event topics cannot be
    /// subscribed.
    pub async fn start(self, cancel: CancellationToken) -> Result<DaemonHandle, CommandBusError> {
        let (pump, shards) = EventPump::connect(self.bus.as_ref(), self.config.reconcile.shards).await?;
        let mut tasks = vec![tokio::spawn(pump.run(cancel.clone()))];

        let router = Arc::new(EventRouter::new(
            HeartbeatHandler::new(
                Arc::clone(&self.agents),
                Arc::clone(&self.queue),
                Arc::clone(&self.lifecycle),
                Arc::clone(&self.cache),
                Arc::clone(&self.clock),
            ),
            StatusEventHandler::new(
                Arc::clone(&self.lifecycle),
                self.circuit_breaker(),
                RestartPolicy::from_config(&self.config.restart),
                Arc::clone(&self.collaborators.entitlements),
                Arc::clone(&self.clock),
            ),
        ));
        for (shard, events) in shards.into_iter().enumerate() {
            tasks.push(tokio::spawn(Arc::clone(&router).run(shard, events, cancel.clone())));
        }

        tasks.push(self.spawn_sweeper(&cancel));
        tasks.push(self.spawn_partition_monitor(&cancel));
        tasks.push(self.spawn_reaper(&cancel));
        tasks.push(self.spawn_circuit_prober(&cancel));
        tasks.push(self.spawn_queue_drainer(&cancel));

        info!(
            shards = self.config.reconcile.shards,
            workers = tasks.len(),
            "control plane started"
        );
        Ok(DaemonHandle { cancel, tasks })
    }

    fn circuit_breaker(&self) -> CircuitBreakerService<C> {
        CircuitBreakerService::new(
            Arc::clone(&self.collaborators.circuits),
            Arc::clone(&self.collaborators.probe),
            self.config.circuit.clone(),
            Arc::clone(&self.clock),
        )
    }

    fn spawn_sweeper(&self, cancel: &CancellationToken) -> JoinHandle<()> {
        let sweeper = Arc::new(TransientSweeper::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.lifecycle),
            self.config.timeouts.clone(),
            Arc::clone(&self.clock),
        ));
        spawn_periodic("sweeper", self.config.intervals.sweep(), cancel.clone(), move || {
            let worker = Arc::clone(&sweeper);
            async move {
                if let Err(err) = worker.sweep().await {
                    warn!(error = %err, "transient sweep failed");
                }
            }
        })
    }

    fn spawn_partition_monitor(&self, cancel: &CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::new(PartitionMonitor::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.cache),
            self.config.timeouts.clone(),
            Arc::clone(&self.clock),
        ));
        spawn_periodic(
            "partition-monitor",
            self.config.intervals.partition_check(),
            cancel.clone(),
            move || {
                let worker = Arc::clone(&monitor);
                async move {
                    if let Err(err) = worker.check().await {
                        warn!(error = %err, "partition check failed");
                    }
                }
            },
        )
    }

    fn spawn_reaper(&self, cancel: &CancellationToken) -> JoinHandle<()> {
        let reaper = Arc::new(ZombieReaper::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.cache),
            Arc::clone(&self.clock),
        ));
        spawn_periodic(
            "zombie-reaper",
            self.config.intervals.zombie_check(),
            cancel.clone(),
            move || {
                let worker = Arc::clone(&reaper);
                async move {
                    if let Err(err) = worker.reap().await {
                        warn!(error = %err, "zombie check failed");
                    }
                }
            },
        )
    }

    fn spawn_circuit_prober(&self, cancel: &CancellationToken) -> JoinHandle<()> {
        let breaker = Arc::new(self.circuit_breaker());
        spawn_periodic(
            "circuit-prober",
            self.config.intervals.circuit_probe(),
            cancel.clone(),
            move || {
                let worker = Arc::clone(&breaker);
                async move {
                    match worker.probe().await {
                        Ok(0) => {}
                        Ok(closed) => info!(closed, "circuits closed after probing"),
                        Err(err) => warn!(error = %err, "circuit probe failed"),
                    }
                }
            },
        )
    }

    /// The drainer runs on its fallback period and whenever capacity may
    /// have been freed.
    fn spawn_queue_drainer(&self, cancel: &CancellationToken) -> JoinHandle<()> {
        let lifecycle = Arc::clone(&self.lifecycle);
        let drain = self.drain.clone();
        let period = self.config.intervals.queue_drain();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(worker = "queue-drainer", "worker started");
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = drain.raised() => debug!("queue drain requested"),
                    _ = interval.tick() => {}
                }
                if let Err(err) = lifecycle.drain_queue().await {
                    warn!(error = %err, "queue drain failed");
                }
            }
            info!(worker = "queue-drainer", "worker stopped");
        })
    }
}

/// Running control plane.
pub struct DaemonHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DaemonHandle {
    /// Returns the token that stops every worker.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stops every worker and waits for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "worker ended abnormally");
            }
        }
        info!("control plane stopped");
    }
}
