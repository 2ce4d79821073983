//! Tests for ranking, queueing and the load-count invariant.

use std::sync::Arc;

use crate::stream::{
    domain::StreamStatus,
    ports::WaitQueue,
    services::{Allocation, StreamAllocator},
};
use crate::test_support::{TestFleet, register_active};
use rstest::{fixture, rstest};

#[fixture]
fn fleet() -> TestFleet {
    TestFleet::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn least_loaded_agent_wins(fleet: TestFleet) {
    let big = register_active(fleet.agents.as_ref(), &fleet.clock, "relay-big", 4).await;
    let small = register_active(fleet.agents.as_ref(), &fleet.clock, "relay-small", 2).await;
    let allocator = fleet.lifecycle.allocator();

    let mut placements = Vec::new();
    for title in ["one", "two", "three"] {
        let id = fleet.create_stream(title).await;
        let allocation = allocator
            .allocate(fleet.stream(id).await)
            .await
            .expect("allocate");
        let Allocation::Assigned { agent, .. } = allocation else {
            panic!("expected an assignment for {title}");
        };
        placements.push(agent);
    }

    // Equal empty ratios fall back to most free slots; then 1/4 beats 1/2.
    assert_eq!(placements, vec![big, small, big]);
    fleet.assert_load_counts().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn name_breaks_full_ties(fleet: TestFleet) {
    let beta = register_active(fleet.agents.as_ref(), &fleet.clock, "relay-b", 2).await;
    let alpha = register_active(fleet.agents.as_ref(), &fleet.clock, "relay-a", 2).await;
    let id = fleet.create_stream("tie").await;

    let allocation = fleet
        .lifecycle
        .allocator()
        .allocate(fleet.stream(id).await)
        .await
        .expect("allocate");

    assert!(matches!(allocation, Allocation::Assigned { agent, .. } if agent == alpha));
    assert_ne!(alpha, beta);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn exhaustion_queues_instead_of_failing(fleet: TestFleet) {
    let id = fleet.create_stream("no room").await;

    let allocation = fleet
        .lifecycle
        .allocator()
        .allocate(fleet.stream(id).await)
        .await
        .expect("allocate");

    assert!(matches!(allocation, Allocation::Queued(_)));
    assert_eq!(fleet.stream(id).await.status(), StreamStatus::Pending);
    assert_eq!(fleet.queue.list().await.expect("list"), vec![id]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn excluded_agent_is_never_picked(fleet: TestFleet) {
    let old = register_active(fleet.agents.as_ref(), &fleet.clock, "relay-old", 8).await;
    let id = fleet.create_stream("move me").await;

    let allocation = fleet
        .lifecycle
        .allocator()
        .allocate_excluding(fleet.stream(id).await, Some(old))
        .await
        .expect("allocate");

    assert!(matches!(allocation, Allocation::Queued(_)));
    assert_eq!(
        fleet
            .lifecycle
            .allocator()
            .spare_capacity(Some(old))
            .await
            .expect("capacity"),
        0
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_allocations_never_overfill(fleet: TestFleet) {
    register_active(fleet.agents.as_ref(), &fleet.clock, "relay-01", 3).await;
    let allocator = Arc::new(StreamAllocator::new(
        Arc::clone(&fleet.agents),
        Arc::clone(&fleet.streams),
        Arc::clone(&fleet.queue),
        Arc::new(fleet.clock.clone()),
    ));

    let mut handles = Vec::new();
    for index in 0..10 {
        let stream = fleet.stream(fleet.create_stream(&format!("race {index}")).await).await;
        let shared = Arc::clone(&allocator);
        handles.push(tokio::spawn(async move { shared.allocate(stream).await }));
    }
    let mut assigned = 0;
    for handle in handles {
        if matches!(
            handle.await.expect("task").expect("allocate"),
            Allocation::Assigned { .. }
        ) {
            assigned += 1;
        }
    }

    assert_eq!(assigned, 3);
    assert_eq!(fleet.queue.list().await.expect("list").len(), 7);
    fleet.assert_load_counts().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn queue_drain_preserves_submission_order(fleet: TestFleet) {
    let (agent, _inbox) = fleet.listening_agent("relay-a", 2).await;
    let mut ids = Vec::new();
    for title in ["S1", "S2", "S3"] {
        let id = fleet.create_stream(title).await;
        fleet.lifecycle.start(id).await.expect("start");
        ids.push(id);
    }
    let [s1, s2, s3] = ids.as_slice() else {
        panic!("three streams");
    };
    assert_eq!(fleet.stream(*s3).await.status(), StreamStatus::Pending);

    // S4 arrives while S3 waits; it queues behind S3.
    let s4 = fleet.create_stream("S4").await;
    fleet.lifecycle.start(s4).await.expect("start S4");
    assert_eq!(fleet.queue.list().await.expect("list"), vec![*s3, s4]);

    fleet
        .lifecycle
        .correct(*s1, |stream, at| Ok(stream.mark_inactive(at)?))
        .await
        .expect("S1 stopped");
    let placed = fleet.lifecycle.drain_queue().await.expect("drain");

    assert_eq!(placed, 1);
    assert_eq!(fleet.stream(*s3).await.assigned_agent(), Some(agent));
    assert_eq!(fleet.stream(*s2).await.assigned_agent(), Some(agent));
    assert_eq!(fleet.stream(s4).await.status(), StreamStatus::Pending);
    assert_eq!(fleet.queue.list().await.expect("list"), vec![s4]);
    fleet.assert_load_counts().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn drain_discards_streams_that_stopped_waiting(fleet: TestFleet) {
    let first = fleet.create_stream("first").await;
    let second = fleet.create_stream("second").await;
    fleet.lifecycle.start(first).await.expect("queue first");
    fleet.lifecycle.start(second).await.expect("queue second");
    fleet
        .lifecycle
        .correct(first, |stream, at| Ok(stream.mark_inactive(at)?))
        .await
        .expect("first gave up waiting");
    let (agent, _inbox) = fleet.listening_agent("relay-a", 1).await;

    fleet.lifecycle.drain_queue().await.expect("drain");

    assert_eq!(fleet.stream(first).await.status(), StreamStatus::Inactive);
    assert_eq!(fleet.stream(second).await.assigned_agent(), Some(agent));
    assert!(fleet.queue.list().await.expect("list").is_empty());
}
