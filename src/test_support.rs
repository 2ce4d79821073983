//! Builders shared by unit tests across modules.

use crate::bus::{
    adapters::InMemoryCommandBus,
    services::{AgentInbox, AgentReporter, CommandDispatcher},
};
use crate::clock::ManualClock;
use crate::config::{CircuitConfig, DispatchConfig, RestartConfig, TimeoutConfig};
use crate::fleet::{
    adapters::memory::InMemoryAgentRegistry,
    domain::{Agent, AgentCapabilities, AgentId, AgentName, AgentStatus},
    ports::AgentRegistry,
};
use crate::reconcile::{
    domain::HeartbeatCache,
    services::{HeartbeatHandler, StatusEventHandler, TransientSweeper},
};
use crate::resilience::{
    adapters::InMemoryCircuitStore,
    domain::RestartPolicy,
    ports::{CircuitStateStore, EndpointProbe, EntitlementCheck, MockEndpointProbe},
    services::CircuitBreakerService,
};
use crate::signal::DrainSignal;
use crate::stream::{
    adapters::memory::{InMemoryStreamRepository, InMemoryWaitQueue},
    domain::{NewStreamParams, OwnerId, RelayTarget, Stream, StreamId, VideoFile},
    ports::StreamRepository,
    services::{CreateStreamRequest, StreamLifecycleService},
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Ingest bases that may substitute for each other in tests.
pub(crate) const PRIMARY_INGEST: &str = "rtmp://a.rtmp.example.com";
pub(crate) const BACKUP_INGEST: &str = "rtmp://b.rtmp.example.com";

pub(crate) fn sample_files() -> Vec<VideoFile> {
    vec![
        VideoFile::new(
            "file-1",
            "intro.mp4",
            "https://media.example.com/files/file-1",
            1_048_576,
        )
        .expect("valid file"),
    ]
}

pub(crate) fn sample_params(title: &str) -> NewStreamParams {
    NewStreamParams {
        owner: OwnerId::from_uuid(Uuid::new_v4()),
        title: title.to_owned(),
        video_files: sample_files(),
        primary_target: RelayTarget::parse("rtmp://a.rtmp.example.com/live2/key-1")
            .expect("valid target"),
        push_targets: vec![
            RelayTarget::parse("rtmps://live.example.net:443/app/key-2").expect("valid target"),
        ],
        loop_playback: true,
    }
}

pub(crate) fn sample_stream(title: &str, clock: &impl Clock) -> Stream {
    Stream::new(sample_params(title), clock).expect("valid stream")
}

pub(crate) async fn register_active(
    registry: &impl AgentRegistry,
    clock: &ManualClock,
    name: &str,
    max_streams: u32,
) -> AgentId {
    let agent = Agent::new(
        AgentName::new(name).expect("valid name"),
        "198.51.100.7",
        max_streams,
        AgentCapabilities::new(),
        clock,
    )
    .expect("valid agent");
    registry.register(&agent).await.expect("register agent");
    for status in [AgentStatus::Provisioning, AgentStatus::Active] {
        let moved = registry
            .transition_status(agent.id(), &AgentStatus::ALL, status, clock.utc())
            .await
            .expect("transition");
        assert!(moved, "agent {name} should reach {status}");
    }
    agent.id()
}

pub(crate) type MemoryLifecycle = StreamLifecycleService<
    InMemoryAgentRegistry,
    InMemoryStreamRepository,
    InMemoryWaitQueue,
    InMemoryCommandBus,
    ManualClock,
>;

pub(crate) type MemoryStatusHandler = StatusEventHandler<
    InMemoryAgentRegistry,
    InMemoryStreamRepository,
    InMemoryWaitQueue,
    InMemoryCommandBus,
    ManualClock,
>;

pub(crate) type MemoryHeartbeatHandler = HeartbeatHandler<
    InMemoryAgentRegistry,
    InMemoryStreamRepository,
    InMemoryWaitQueue,
    InMemoryCommandBus,
    ManualClock,
>;

pub(crate) type MemorySweeper = TransientSweeper<
    InMemoryAgentRegistry,
    InMemoryStreamRepository,
    InMemoryWaitQueue,
    InMemoryCommandBus,
    ManualClock,
>;

pub(crate) fn circuit_config() -> CircuitConfig {
    CircuitConfig {
        failure_threshold: 2,
        open_secs: 60,
        fallback_groups: vec![vec![PRIMARY_INGEST.to_owned(), BACKUP_INGEST.to_owned()]],
    }
}

pub(crate) fn fast_dispatch() -> DispatchConfig {
    DispatchConfig {
        attempts: 2,
        initial_backoff_millis: 1,
        max_backoff_millis: 2,
    }
}

/// In-memory control plane with a manual clock.
pub(crate) struct TestFleet {
    pub(crate) agents: Arc<InMemoryAgentRegistry>,
    pub(crate) streams: Arc<InMemoryStreamRepository>,
    pub(crate) queue: Arc<InMemoryWaitQueue>,
    pub(crate) bus: Arc<InMemoryCommandBus>,
    pub(crate) clock: ManualClock,
    pub(crate) drain: DrainSignal,
    pub(crate) lifecycle: Arc<MemoryLifecycle>,
    pub(crate) circuits: Arc<InMemoryCircuitStore>,
    pub(crate) cache: Arc<HeartbeatCache>,
    pub(crate) timeouts: TimeoutConfig,
}

impl TestFleet {
    pub(crate) fn new() -> Self {
        let agents = Arc::new(InMemoryAgentRegistry::new());
        let streams = Arc::new(InMemoryStreamRepository::new());
        let queue = Arc::new(InMemoryWaitQueue::new());
        let bus = Arc::new(InMemoryCommandBus::new());
        let clock = ManualClock::starting_now();
        let drain = DrainSignal::new();
        let lifecycle = Arc::new(StreamLifecycleService::new(
            Arc::clone(&agents),
            Arc::clone(&streams),
            Arc::clone(&queue),
            CommandDispatcher::new(Arc::clone(&bus), &fast_dispatch()),
            Arc::new(clock.clone()),
            drain.clone(),
        ));
        Self {
            agents,
            streams,
            queue,
            bus,
            clock,
            drain,
            lifecycle,
            circuits: Arc::new(InMemoryCircuitStore::new()),
            cache: Arc::new(HeartbeatCache::new(Duration::from_secs(30))),
            timeouts: TimeoutConfig::default(),
        }
    }

    pub(crate) fn circuit_breaker(&self, probe: Arc<dyn EndpointProbe>) -> CircuitBreakerService<ManualClock> {
        let store: Arc<dyn CircuitStateStore> = self.circuits.clone();
        CircuitBreakerService::new(
            store,
            probe,
            circuit_config(),
            Arc::new(self.clock.clone()),
        )
    }

    /// Status handler whose circuit breaker never probes.
    pub(crate) fn status_handler(&self, entitlements: Arc<dyn EntitlementCheck>) -> MemoryStatusHandler {
        StatusEventHandler::new(
            Arc::clone(&self.lifecycle),
            self.circuit_breaker(Arc::new(MockEndpointProbe::new())),
            RestartPolicy::from_config(&RestartConfig::default()),
            entitlements,
            Arc::new(self.clock.clone()),
        )
    }

    pub(crate) fn heartbeat_handler(&self) -> MemoryHeartbeatHandler {
        HeartbeatHandler::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.queue),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.cache),
            Arc::new(self.clock.clone()),
        )
    }

    pub(crate) fn sweeper(&self) -> MemorySweeper {
        TransientSweeper::new(
            Arc::clone(&self.agents),
            Arc::clone(&self.lifecycle),
            self.timeouts.clone(),
            Arc::new(self.clock.clone()),
        )
    }

    /// Creates a stream, starts it and confirms it, as a healthy relay would.
    pub(crate) async fn streaming(&self, title: &str) -> StreamId {
        let id = self.create_stream(title).await;
        let started = self.lifecycle.start(id).await.expect("start");
        let agent = started.assigned_agent().expect("allocated");
        self.lifecycle
            .correct(id, |stream, at| {
                stream.mark_streaming(at)?;
                Ok(())
            })
            .await
            .expect("confirm");
        assert!(self.agent(agent).await.current_streams() > 0);
        id
    }

    /// Registers an `Active` agent that listens for commands.
    pub(crate) async fn listening_agent(&self, name: &str, max_streams: u32) -> (AgentId, AgentInbox) {
        let id = register_active(self.agents.as_ref(), &self.clock, name, max_streams).await;
        let inbox = AgentReporter::new(Arc::clone(&self.bus), id)
            .inbox()
            .await
            .expect("subscribe");
        (id, inbox)
    }

    pub(crate) async fn create_stream(&self, title: &str) -> StreamId {
        let params = sample_params(title);
        let request = CreateStreamRequest::new(
            params.owner,
            title,
            params.video_files,
            params.primary_target.as_str(),
        )
        .with_loop_playback(true);
        self.lifecycle.create(request).await.expect("create stream").id()
    }

    pub(crate) async fn stream(&self, id: StreamId) -> Stream {
        self.lifecycle.find(id).await.expect("stream exists")
    }

    pub(crate) async fn agent(&self, id: AgentId) -> Agent {
        self.agents
            .find_by_id(id)
            .await
            .expect("lookup")
            .expect("agent exists")
    }

    /// Asserts that every agent's count equals the streams counted on it.
    pub(crate) async fn assert_load_counts(&self) {
        for agent in self.agents.list_all().await.expect("list agents") {
            let counted = self
                .streams
                .count_counted_on(agent.id())
                .await
                .expect("count");
            assert_eq!(
                agent.current_streams(),
                counted,
                "agent {} load does not match its streams",
                agent.name()
            );
        }
    }
}
