//! In-memory control plane shared by the integration and behaviour tests.

use relayfleet::bus::{
    adapters::InMemoryCommandBus,
    domain::{AgentCommand, Heartbeat, ReportedStatus, StatusEvent},
    services::{AgentInbox, AgentReporter, CommandDispatcher},
};
use relayfleet::clock::ManualClock;
use relayfleet::config::{DispatchConfig, OrchestratorConfig};
use relayfleet::fleet::{
    adapters::memory::InMemoryAgentRegistry,
    domain::{Agent, AgentId},
    ports::AgentRegistry,
    services::{FleetRegistryService, RegisterAgentRequest},
};
use relayfleet::reconcile::{
    domain::HeartbeatCache,
    services::{HeartbeatHandler, HeartbeatOutcome, StatusEventHandler, StatusOutcome, TransientSweeper},
};
use relayfleet::resilience::{
    adapters::{InMemoryCircuitStore, StaticEntitlements, TcpEndpointProbe},
    domain::RestartPolicy,
    services::{CircuitBreakerService, PartitionMonitor},
};
use relayfleet::signal::DrainSignal;
use relayfleet::stream::{
    adapters::memory::{InMemoryStreamRepository, InMemoryWaitQueue},
    domain::{OwnerId, Stream, StreamId, StreamStatus, VideoFile},
    ports::StreamRepository,
    services::{CreateStreamRequest, StreamLifecycleService},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Lifecycle service over the in-memory stores.
pub type Lifecycle = StreamLifecycleService<
    InMemoryAgentRegistry,
    InMemoryStreamRepository,
    InMemoryWaitQueue,
    InMemoryCommandBus,
    ManualClock,
>;

/// Ingest URL every test stream relays to.
pub const INGEST_URL: &str = "rtmp://a.rtmp.example.com/live2/key-1";

/// Control plane services wired over in-memory stores and a manual clock.
pub struct Fleet {
    pub agents: Arc<InMemoryAgentRegistry>,
    pub streams: Arc<InMemoryStreamRepository>,
    pub queue: Arc<InMemoryWaitQueue>,
    pub bus: Arc<InMemoryCommandBus>,
    pub clock: ManualClock,
    pub config: OrchestratorConfig,
    pub registry: FleetRegistryService<InMemoryAgentRegistry, ManualClock>,
    pub lifecycle: Arc<Lifecycle>,
    pub cache: Arc<HeartbeatCache>,
    inboxes: Mutex<HashMap<AgentId, AgentInbox>>,
    status: StatusEventHandler<
        InMemoryAgentRegistry,
        InMemoryStreamRepository,
        InMemoryWaitQueue,
        InMemoryCommandBus,
        ManualClock,
    >,
    heartbeats: HeartbeatHandler<
        InMemoryAgentRegistry,
        InMemoryStreamRepository,
        InMemoryWaitQueue,
        InMemoryCommandBus,
        ManualClock,
    >,
}

impl Fleet {
    /// Builds a fleet with default thresholds and fast command retries.
    #[must_use]
    pub fn new() -> Self {
        let config = OrchestratorConfig {
            dispatch: DispatchConfig {
                attempts: 2,
                initial_backoff_millis: 1,
                max_backoff_millis: 2,
            },
            ..OrchestratorConfig::default()
        };
        let agents = Arc::new(InMemoryAgentRegistry::new());
        let streams = Arc::new(InMemoryStreamRepository::new());
        let queue = Arc::new(InMemoryWaitQueue::new());
        let bus = Arc::new(InMemoryCommandBus::new());
        let clock = ManualClock::starting_now();
        let shared_clock = Arc::new(clock.clone());
        let drain = DrainSignal::new();
        let lifecycle = Arc::new(StreamLifecycleService::new(
            Arc::clone(&agents),
            Arc::clone(&streams),
            Arc::clone(&queue),
            CommandDispatcher::new(Arc::clone(&bus), &config.dispatch),
            Arc::clone(&shared_clock),
            drain.clone(),
        ));
        let cache = Arc::new(HeartbeatCache::new(config.reconcile.heartbeat_cache_ttl()));
        let breaker = CircuitBreakerService::new(
            Arc::new(InMemoryCircuitStore::new()),
            Arc::new(TcpEndpointProbe::default()),
            config.circuit.clone(),
            Arc::clone(&shared_clock),
        );
        let status = StatusEventHandler::new(
            Arc::clone(&lifecycle),
            breaker,
            RestartPolicy::from_config(&config.restart),
            Arc::new(StaticEntitlements::everyone()),
            Arc::clone(&shared_clock),
        );
        let heartbeats = HeartbeatHandler::new(
            Arc::clone(&agents),
            Arc::clone(&queue),
            Arc::clone(&lifecycle),
            Arc::clone(&cache),
            Arc::clone(&shared_clock),
        );
        let registry = FleetRegistryService::new(Arc::clone(&agents), shared_clock, drain);
        Self {
            agents,
            streams,
            queue,
            bus,
            clock,
            config,
            registry,
            lifecycle,
            cache,
            inboxes: Mutex::new(HashMap::new()),
            status,
            heartbeats,
        }
    }

    /// Registers an agent, brings it to `Active` and subscribes its inbox
    /// so commands sent to it are delivered.
    ///
    /// # Errors
    ///
    /// Returns the registry or subscription failure.
    pub async fn active_agent(&self, name: &str, max_streams: u32) -> eyre::Result<AgentId> {
        let agent = self
            .registry
            .register(RegisterAgentRequest::new(name, "198.51.100.20", max_streams))
            .await?;
        let id = agent.id();
        let inbox = AgentReporter::new(Arc::clone(&self.bus), id).inbox().await?;
        self.inboxes
            .lock()
            .map_err(|_| eyre::eyre!("agent inboxes poisoned"))?
            .insert(id, inbox);
        self.registry.begin_provisioning(id).await?;
        self.registry.mark_provisioned(id).await?;
        Ok(id)
    }

    /// Returns the commands delivered to `agent` since the last call.
    ///
    /// # Errors
    ///
    /// Returns an error when the agent has no inbox or a command does not
    /// decode.
    pub fn commands_for(&self, agent: AgentId) -> eyre::Result<Vec<AgentCommand>> {
        let mut inboxes = self
            .inboxes
            .lock()
            .map_err(|_| eyre::eyre!("agent inboxes poisoned"))?;
        let inbox = inboxes
            .get_mut(&agent)
            .ok_or_else(|| eyre::eyre!("agent {agent} has no inbox"))?;
        Ok(inbox.drain().into_iter().collect::<Result<_, _>>()?)
    }

    /// Creates an inactive stream.
    ///
    /// # Errors
    ///
    /// Returns the validation or persistence failure.
    pub async fn create_stream(&self, title: &str) -> eyre::Result<StreamId> {
        let file = VideoFile::new(
            "file-1",
            "intro.mp4",
            "https://media.example.com/files/file-1",
            1_048_576,
        )?;
        let request = CreateStreamRequest::new(OwnerId::from_uuid(Uuid::new_v4()), title, vec![file], INGEST_URL);
        Ok(self.lifecycle.create(request).await?.id())
    }

    /// Creates and starts a stream.
    ///
    /// # Errors
    ///
    /// Returns the creation or start failure.
    pub async fn started_stream(&self, title: &str) -> eyre::Result<Stream> {
        let id = self.create_stream(title).await?;
        Ok(self.lifecycle.start(id).await?)
    }

    /// Delivers a status report from `agent`.
    ///
    /// # Errors
    ///
    /// Returns the reconciliation failure.
    pub async fn report(
        &self,
        stream: StreamId,
        agent: AgentId,
        status: ReportedStatus,
    ) -> eyre::Result<StatusOutcome> {
        Ok(self
            .status
            .handle(&StatusEvent::new(stream, agent, status))
            .await?)
    }

    /// Delivers a crash report with `message`.
    ///
    /// # Errors
    ///
    /// Returns the reconciliation failure.
    pub async fn report_crash(
        &self,
        stream: StreamId,
        agent: AgentId,
        message: &str,
    ) -> eyre::Result<StatusOutcome> {
        let event = StatusEvent::new(stream, agent, ReportedStatus::Error).with_message(message);
        Ok(self.status.handle(&event).await?)
    }

    /// Delivers a heartbeat listing `active_streams`.
    ///
    /// # Errors
    ///
    /// Returns the reconciliation failure.
    pub async fn heartbeat(
        &self,
        agent: AgentId,
        active_streams: Vec<StreamId>,
    ) -> eyre::Result<HeartbeatOutcome> {
        Ok(self
            .heartbeats
            .handle(&Heartbeat {
                vps_id: agent,
                active_streams,
            })
            .await?)
    }

    /// Builds a transient sweeper.
    #[must_use]
    pub fn sweeper(
        &self,
    ) -> TransientSweeper<InMemoryAgentRegistry, InMemoryStreamRepository, InMemoryWaitQueue, InMemoryCommandBus, ManualClock>
    {
        TransientSweeper::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.lifecycle),
            self.config.timeouts.clone(),
            Arc::new(self.clock.clone()),
        )
    }

    /// Builds a partition monitor.
    #[must_use]
    pub fn partition_monitor(
        &self,
    ) -> PartitionMonitor<InMemoryAgentRegistry, InMemoryStreamRepository, InMemoryWaitQueue, InMemoryCommandBus, ManualClock>
    {
        PartitionMonitor::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.cache),
            self.config.timeouts.clone(),
            Arc::new(self.clock.clone()),
        )
    }

    /// Returns the stored stream.
    ///
    /// # Errors
    ///
    /// Returns the lookup failure.
    pub async fn stream(&self, id: StreamId) -> eyre::Result<Stream> {
        Ok(self.lifecycle.find(id).await?)
    }

    /// Returns the stored stream status.
    ///
    /// # Errors
    ///
    /// Returns the lookup failure.
    pub async fn status_of(&self, id: StreamId) -> eyre::Result<StreamStatus> {
        Ok(self.stream(id).await?.status())
    }

    /// Returns the stored agent.
    ///
    /// # Errors
    ///
    /// Returns the lookup failure, or an error when the agent is gone.
    pub async fn agent(&self, id: AgentId) -> eyre::Result<Agent> {
        self.agents
            .find_by_id(id)
            .await?
            .ok_or_else(|| eyre::eyre!("agent {id} not found"))
    }

    /// Checks that every agent's counted load equals the streams holding
    /// one of its slots.
    ///
    /// # Errors
    ///
    /// Returns a description of the first mismatch.
    pub async fn check_load_counts(&self) -> eyre::Result<()> {
        for agent in self.agents.list_all().await? {
            let counted = self.streams.count_counted_on(agent.id()).await?;
            if agent.current_streams() != counted {
                return Err(eyre::eyre!(
                    "agent {} counts {} streams but {} hold its slots",
                    agent.name(),
                    agent.current_streams(),
                    counted
                ));
            }
        }
        Ok(())
    }
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new()
    }
}
