//! Revision-checked writes on the `streams` table.

use crate::postgres::helpers::{FleetDatabase, active_agent, stored_stream, test_runtime};
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use relayfleet::clock::ManualClock;
use relayfleet::stream::{
    domain::StreamStatus,
    ports::{StreamRepository, StreamRepositoryError},
};
use mockable::Clock;
use rstest::rstest;

#[rstest]
fn stale_revision_is_a_conflict(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "stale_rev").expect("database");
    let streams = db.streams();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let stream = rt
        .block_on(stored_stream(streams.as_ref(), &clock, "Show"))
        .expect("stream");
    let mut winner = stream.clone();
    let mut loser = stream;

    winner.set_schedule_enabled(false, clock.utc());
    let saved = rt.block_on(streams.update(&winner)).expect("first writer");
    loser.set_schedule_enabled(true, clock.utc());
    let result = rt.block_on(streams.update(&loser));

    assert_eq!(saved.revision(), 1);
    assert!(matches!(
        result,
        Err(StreamRepositoryError::Conflict { id, expected: 0 }) if id == loser.id()
    ));
    let stored = rt
        .block_on(streams.find_by_id(loser.id()))
        .expect("find")
        .expect("stream exists");
    assert!(!stored.schedule_enabled());
}

#[rstest]
fn updating_a_missing_stream_is_not_found(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "missing").expect("database");
    let streams = db.streams();
    let other = FleetDatabase::create(shared_test_cluster, "missing_src").expect("database");
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let stream = rt
        .block_on(stored_stream(other.streams().as_ref(), &clock, "Elsewhere"))
        .expect("stream");

    let result = rt.block_on(streams.update(&stream));

    assert!(matches!(result, Err(StreamRepositoryError::NotFound(id)) if id == stream.id()));
}

#[rstest]
fn counted_streams_follow_their_status(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "counted").expect("database");
    let streams = db.streams();
    let registry = db.agents();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let agent = rt
        .block_on(active_agent(registry.as_ref(), &clock, "relay-a", 4))
        .expect("agent");
    let mut running = rt
        .block_on(stored_stream(streams.as_ref(), &clock, "Running"))
        .expect("stream");
    let mut finished = rt
        .block_on(stored_stream(streams.as_ref(), &clock, "Finished"))
        .expect("stream");

    running.begin_start(agent, clock.utc()).expect("start");
    rt.block_on(streams.update(&running)).expect("save running");
    finished.begin_start(agent, clock.utc()).expect("start");
    let mut stopped = rt.block_on(streams.update(&finished)).expect("save finished");
    stopped.mark_inactive(clock.utc()).expect("inactive");
    rt.block_on(streams.update(&stopped)).expect("save stopped");

    let counted = rt
        .block_on(streams.count_counted_on(agent))
        .expect("count");
    let starting = rt
        .block_on(streams.list_by_status(StreamStatus::Starting))
        .expect("list");

    assert_eq!(counted, 1);
    assert_eq!(
        starting.iter().map(|stream| stream.id()).collect::<Vec<_>>(),
        vec![running.id()]
    );
}
