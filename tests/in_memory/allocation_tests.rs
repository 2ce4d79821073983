//! Placement and queueing across a small fleet.

use crate::test_helpers::Fleet;
use relayfleet::bus::domain::{AgentCommand, StreamConfig};
use relayfleet::stream::domain::StreamStatus;
use rstest::{fixture, rstest};

#[fixture]
fn fleet() -> Fleet {
    Fleet::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn streams_spread_across_the_least_loaded_agents(fleet: Fleet) -> eyre::Result<()> {
    let big = fleet.active_agent("relay-big", 4).await?;
    let small = fleet.active_agent("relay-small", 2).await?;

    let first = fleet.started_stream("first").await?;
    let second = fleet.started_stream("second").await?;
    let third = fleet.started_stream("third").await?;

    assert_eq!(first.assigned_agent(), Some(big));
    assert_eq!(second.assigned_agent(), Some(small));
    assert_eq!(third.assigned_agent(), Some(big));
    assert_eq!(fleet.agent(big).await?.current_streams(), 2);
    assert_eq!(fleet.agent(small).await?.current_streams(), 1);
    fleet.check_load_counts().await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn queued_streams_start_in_arrival_order(fleet: Fleet) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 1).await?;
    let running = fleet.started_stream("running").await?;
    let early = fleet.started_stream("early").await?;
    let late = fleet.started_stream("late").await?;
    assert_eq!(early.status(), StreamStatus::Pending);
    assert_eq!(late.status(), StreamStatus::Pending);

    fleet.lifecycle.stop(running.id()).await?;
    fleet
        .report(running.id(), agent, relayfleet::bus::domain::ReportedStatus::Stopped)
        .await?;
    let placed = fleet.lifecycle.drain_queue().await?;

    assert_eq!(placed, 1);
    assert_eq!(fleet.status_of(early.id()).await?, StreamStatus::Starting);
    assert_eq!(fleet.status_of(late.id()).await?, StreamStatus::Pending);
    fleet.check_load_counts().await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopping_a_queued_stream_removes_it_from_the_queue(fleet: Fleet) -> eyre::Result<()> {
    fleet.active_agent("relay-a", 1).await?;
    let running = fleet.started_stream("running").await?;
    let waiting = fleet.started_stream("waiting").await?;

    let stopped = fleet.lifecycle.stop(waiting.id()).await?;
    fleet.lifecycle.stop(running.id()).await?;
    fleet.clock.advance(std::time::Duration::from_secs(61));
    fleet.sweeper().sweep().await?;
    let placed = fleet.lifecycle.drain_queue().await?;

    assert_eq!(stopped.status(), StreamStatus::Inactive);
    assert_eq!(placed, 0);
    assert_eq!(fleet.status_of(waiting.id()).await?, StreamStatus::Inactive);
    fleet.check_load_counts().await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn a_new_agent_absorbs_the_queue(fleet: Fleet) -> eyre::Result<()> {
    let waiting = fleet.started_stream("waiting").await?;
    assert_eq!(waiting.status(), StreamStatus::Pending);

    let agent = fleet.active_agent("relay-late", 2).await?;
    fleet.lifecycle.drain_queue().await?;

    let placed = fleet.stream(waiting.id()).await?;
    assert_eq!(placed.status(), StreamStatus::Starting);
    assert_eq!(placed.assigned_agent(), Some(agent));
    fleet.check_load_counts().await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn started_stream_reaches_its_agent(fleet: Fleet) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 1).await?;

    let stream = fleet.started_stream("show").await?;

    assert_eq!(stream.status(), StreamStatus::Starting);
    let commands = fleet.commands_for(agent)?;
    assert_eq!(
        commands,
        vec![AgentCommand::StartStream(StreamConfig::from_stream(&stream))]
    );
    Ok(())
}
