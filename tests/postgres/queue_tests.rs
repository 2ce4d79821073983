//! FIFO order of the `stream_queue` table.

use crate::postgres::helpers::{FleetDatabase, stored_stream, test_runtime};
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use relayfleet::clock::ManualClock;
use relayfleet::stream::ports::WaitQueue;
use mockable::Clock;
use rstest::rstest;
use std::time::Duration;

#[rstest]
fn queue_serves_streams_in_arrival_order(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "fifo").expect("database");
    let streams = db.streams();
    let queue = db.queue();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let ids: Vec<_> = ["First", "Second", "Third"]
        .into_iter()
        .map(|title| {
            rt.block_on(stored_stream(streams.as_ref(), &clock, title))
                .expect("stream")
                .id()
        })
        .collect();

    // Later arrivals carry earlier timestamps; order follows insertion.
    for id in &ids {
        clock.set(clock.utc() - chrono::Duration::minutes(1));
        assert!(rt.block_on(queue.push(*id, clock.utc())).expect("push"));
    }

    assert_eq!(rt.block_on(queue.list()).expect("list"), ids);
    assert_eq!(rt.block_on(queue.peek()).expect("peek"), ids.first().copied());
}

#[rstest]
fn requeued_streams_keep_their_place(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "requeue").expect("database");
    let streams = db.streams();
    let queue = db.queue();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let first = rt
        .block_on(stored_stream(streams.as_ref(), &clock, "First"))
        .expect("stream");
    let second = rt
        .block_on(stored_stream(streams.as_ref(), &clock, "Second"))
        .expect("stream");
    rt.block_on(queue.push(first.id(), clock.utc())).expect("push");
    rt.block_on(queue.push(second.id(), clock.utc())).expect("push");

    clock.advance(Duration::from_secs(30));
    let duplicate = rt
        .block_on(queue.push(first.id(), clock.utc()))
        .expect("push again");

    assert!(!duplicate);
    assert_eq!(
        rt.block_on(queue.list()).expect("list"),
        vec![first.id(), second.id()]
    );
}

#[rstest]
fn removing_the_head_promotes_the_next(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "dequeue").expect("database");
    let streams = db.streams();
    let queue = db.queue();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let first = rt
        .block_on(stored_stream(streams.as_ref(), &clock, "First"))
        .expect("stream");
    let second = rt
        .block_on(stored_stream(streams.as_ref(), &clock, "Second"))
        .expect("stream");
    rt.block_on(queue.push(first.id(), clock.utc())).expect("push");
    rt.block_on(queue.push(second.id(), clock.utc())).expect("push");

    assert!(rt.block_on(queue.remove(first.id())).expect("remove"));
    assert!(!rt.block_on(queue.remove(first.id())).expect("remove again"));

    assert_eq!(rt.block_on(queue.peek()).expect("peek"), Some(second.id()));
}
