//! Slot accounting on the `agents` table.

use crate::postgres::helpers::{FleetDatabase, active_agent, test_runtime};
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use relayfleet::clock::ManualClock;
use relayfleet::fleet::{
    domain::{Agent, AgentCapabilities, AgentName},
    ports::{AgentRegistry, AgentRegistryError},
};
use mockable::Clock;
use rstest::rstest;
use std::sync::Arc;

#[rstest]
fn concurrent_reservations_never_exceed_capacity(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "reserve_race").expect("database");
    let registry = db.agents();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let agent = rt
        .block_on(active_agent(registry.as_ref(), &clock, "relay-a", 3))
        .expect("agent");

    let granted = rt.block_on(async {
        let attempts: Vec<_> = (0..12)
            .map(|_| {
                let shared = Arc::clone(&registry);
                let at = clock.utc();
                tokio::spawn(async move { shared.try_reserve_slot(agent, at).await })
            })
            .collect();
        let mut granted = 0;
        for attempt in attempts {
            if attempt.await.expect("join").expect("reserve") {
                granted += 1;
            }
        }
        granted
    });

    assert_eq!(granted, 3);
    let stored = rt
        .block_on(registry.find_by_id(agent))
        .expect("find")
        .expect("agent exists");
    assert_eq!(stored.current_streams(), 3);
}

#[rstest]
fn release_never_goes_below_zero(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "release_floor").expect("database");
    let registry = db.agents();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let agent = rt
        .block_on(active_agent(registry.as_ref(), &clock, "relay-a", 2))
        .expect("agent");

    rt.block_on(registry.release_slot(agent, clock.utc()))
        .expect("release");

    let stored = rt
        .block_on(registry.find_by_id(agent))
        .expect("find")
        .expect("agent exists");
    assert_eq!(stored.current_streams(), 0);
}

#[rstest]
fn reconcile_applies_only_to_the_expected_count(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "reconcile_cas").expect("database");
    let registry = db.agents();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let agent = rt
        .block_on(active_agent(registry.as_ref(), &clock, "relay-a", 2))
        .expect("agent");
    rt.block_on(registry.try_reserve_slot(agent, clock.utc()))
        .expect("reserve");

    let stale = rt
        .block_on(registry.reconcile_stream_count(agent, 0, 2, clock.utc()))
        .expect("stale reconcile");
    let applied = rt
        .block_on(registry.reconcile_stream_count(agent, 1, 0, clock.utc()))
        .expect("reconcile");

    assert!(!stale);
    assert!(applied);
    let stored = rt
        .block_on(registry.find_by_id(agent))
        .expect("find")
        .expect("agent exists");
    assert_eq!(stored.current_streams(), 0);
}

#[rstest]
fn lowered_capacity_keeps_the_counted_load(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "shrink").expect("database");
    let registry = db.agents();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    let agent = rt
        .block_on(active_agent(registry.as_ref(), &clock, "relay-a", 3))
        .expect("agent");
    for _ in 0..3 {
        rt.block_on(registry.try_reserve_slot(agent, clock.utc()))
            .expect("reserve");
    }

    rt.block_on(registry.set_capacity(agent, 1, clock.utc()))
        .expect("shrink");
    let refused = rt
        .block_on(registry.try_reserve_slot(agent, clock.utc()))
        .expect("reserve");
    let healed = rt
        .block_on(registry.reconcile_stream_count(agent, 3, 2, clock.utc()))
        .expect("reconcile");

    assert!(!refused);
    assert!(healed);
    let stored = rt
        .block_on(registry.find_by_id(agent))
        .expect("find")
        .expect("agent exists");
    assert_eq!(stored.max_streams(), 1);
    assert_eq!(stored.current_streams(), 2);
    assert_eq!(stored.free_slots(), 0);
}

#[rstest]
fn duplicate_names_are_rejected(shared_test_cluster: &'static TestCluster) {
    let db = FleetDatabase::create(shared_test_cluster, "dup_name").expect("database");
    let registry = db.agents();
    let clock = ManualClock::starting_now();
    let rt = test_runtime();
    rt.block_on(active_agent(registry.as_ref(), &clock, "relay-a", 1))
        .expect("agent");
    let twin = Agent::new(
        AgentName::new("relay-a").expect("name"),
        "198.51.100.31",
        1,
        AgentCapabilities::new(),
        &clock,
    )
    .expect("agent");

    let result = rt.block_on(registry.register(&twin));

    assert!(matches!(
        result,
        Err(AgentRegistryError::DuplicateAgentName(name)) if name.as_str() == "relay-a"
    ));
}
