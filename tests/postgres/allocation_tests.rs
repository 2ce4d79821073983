//! Concurrent allocation through the lifecycle service over `PostgreSQL`.

use crate::postgres::helpers::{FleetDatabase, active_agent, test_runtime};
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use relayfleet::bus::{
    adapters::InMemoryCommandBus,
    domain::AgentCommand,
    services::{AgentReporter, CommandDispatcher},
};
use relayfleet::clock::ManualClock;
use relayfleet::config::DispatchConfig;
use relayfleet::fleet::ports::AgentRegistry;
use relayfleet::signal::DrainSignal;
use relayfleet::stream::{
    domain::{OwnerId, StreamStatus, VideoFile},
    ports::{StreamRepository, WaitQueue},
    services::{CreateStreamRequest, StreamLifecycleService},
};
use rstest::rstest;
use std::sync::Arc;
use uuid::Uuid;

#[rstest]
fn racing_starts_fill_the_fleet_and_queue_the_rest(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "alloc_race").expect("database");
    let agents = db.agents();
    let streams = db.streams();
    let queue = db.queue();
    let bus = Arc::new(InMemoryCommandBus::new());
    let clock = ManualClock::starting_now();
    let lifecycle = Arc::new(StreamLifecycleService::new(
        Arc::clone(&agents),
        Arc::clone(&streams),
        Arc::clone(&queue),
        CommandDispatcher::new(Arc::clone(&bus), &DispatchConfig::default()),
        Arc::new(clock.clone()),
        DrainSignal::new(),
    ));
    let rt = test_runtime();

    let (relays, mut inboxes) = rt.block_on(async {
        let mut relays = Vec::new();
        let mut inboxes = Vec::new();
        for name in ["relay-a", "relay-b"] {
            let id = active_agent(agents.as_ref(), &clock, name, 2)
                .await
                .expect("agent");
            inboxes.push(
                AgentReporter::new(Arc::clone(&bus), id)
                    .inbox()
                    .await
                    .expect("inbox"),
            );
            relays.push(id);
        }
        (relays, inboxes)
    });
    let ids = rt.block_on(async {
        let mut ids = Vec::new();
        for n in 0..7 {
            let file = VideoFile::new(
                "file-1",
                "intro.mp4",
                "https://media.example.com/files/file-1",
                1_048_576,
            )
            .expect("file");
            let request = CreateStreamRequest::new(
                OwnerId::from_uuid(Uuid::new_v4()),
                format!("Show {n}"),
                vec![file],
                "rtmp://a.rtmp.example.com/live2/key-1",
            );
            ids.push(lifecycle.create(request).await.expect("create").id());
        }
        ids
    });

    let statuses = rt.block_on(async {
        let starts: Vec<_> = ids
            .iter()
            .map(|&id| {
                let service = Arc::clone(&lifecycle);
                tokio::spawn(async move { service.start(id).await })
            })
            .collect();
        let mut statuses = Vec::new();
        for start in starts {
            statuses.push(start.await.expect("join").expect("start").status());
        }
        statuses
    });

    let starting = statuses
        .iter()
        .filter(|status| **status == StreamStatus::Starting)
        .count();
    let pending = statuses
        .iter()
        .filter(|status| **status == StreamStatus::Pending)
        .count();
    assert_eq!((starting, pending), (4, 3));
    assert_eq!(rt.block_on(queue.list()).expect("list").len(), 3);
    for (relay, inbox) in relays.iter().zip(inboxes.iter_mut()) {
        let agent = rt
            .block_on(agents.find_by_id(*relay))
            .expect("find")
            .expect("agent exists");
        let counted = rt
            .block_on(streams.count_counted_on(*relay))
            .expect("count");
        assert_eq!(agent.current_streams(), 2);
        assert_eq!(counted, 2);
        let commands = inbox.drain();
        assert_eq!(commands.len(), 2);
        assert!(
            commands
                .iter()
                .all(|command| matches!(command, Ok(AgentCommand::StartStream(_))))
        );
    }
}
