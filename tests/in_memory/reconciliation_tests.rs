//! Agent reports and sweeps driving stream status.

use crate::test_helpers::Fleet;
use relayfleet::bus::domain::ReportedStatus;
use relayfleet::reconcile::services::StatusOutcome;
use relayfleet::stream::domain::StreamStatus;
use rstest::{fixture, rstest};
use std::time::Duration;

#[fixture]
fn fleet() -> Fleet {
    Fleet::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn full_lifecycle_frees_the_slot(fleet: Fleet) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 1).await?;
    let stream = fleet.started_stream("show").await?;

    fleet.report(stream.id(), agent, ReportedStatus::Starting).await?;
    fleet.report(stream.id(), agent, ReportedStatus::Streaming).await?;
    assert_eq!(fleet.status_of(stream.id()).await?, StreamStatus::Streaming);

    fleet.lifecycle.stop(stream.id()).await?;
    assert_eq!(fleet.agent(agent).await?.current_streams(), 1);
    fleet.report(stream.id(), agent, ReportedStatus::Stopped).await?;

    let stopped = fleet.stream(stream.id()).await?;
    assert_eq!(stopped.status(), StreamStatus::Inactive);
    assert_eq!(stopped.assigned_agent(), None);
    assert_eq!(fleet.agent(agent).await?.current_streams(), 0);
    fleet.check_load_counts().await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_streaming_reports_are_harmless(fleet: Fleet) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 2).await?;
    let stream = fleet.started_stream("show").await?;
    fleet.report(stream.id(), agent, ReportedStatus::Streaming).await?;
    let before = fleet.stream(stream.id()).await?;

    let outcome = fleet.report(stream.id(), agent, ReportedStatus::Streaming).await?;

    assert_eq!(outcome, StatusOutcome::Applied);
    assert_eq!(fleet.stream(stream.id()).await?.revision(), before.revision());
    assert_eq!(fleet.agent(agent).await?.current_streams(), 1);
    Ok(())
}

#[rstest]
#[case::just_inside(119, StreamStatus::Starting)]
#[case::just_past(121, StreamStatus::Error)]
#[tokio::test(flavor = "multi_thread")]
async fn unconfirmed_start_times_out(
    fleet: Fleet,
    #[case] elapsed_secs: u64,
    #[case] expected: StreamStatus,
) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 1).await?;
    let stream = fleet.started_stream("show").await?;

    fleet.clock.advance(Duration::from_secs(elapsed_secs));
    fleet.heartbeat(agent, vec![stream.id()]).await?;
    fleet.sweeper().sweep().await?;

    assert_eq!(fleet.status_of(stream.id()).await?, expected);
    fleet.check_load_counts().await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn heartbeat_adopts_a_relay_the_control_plane_lost(fleet: Fleet) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 2).await?;
    let stream = fleet.started_stream("show").await?;
    fleet.clock.advance(Duration::from_secs(121));
    fleet.heartbeat(agent, Vec::new()).await?;
    fleet.sweeper().sweep().await?;
    assert_eq!(fleet.status_of(stream.id()).await?, StreamStatus::Error);

    let outcome = fleet.heartbeat(agent, vec![stream.id()]).await?;

    assert_eq!(outcome.reannounced, 1);
    let adopted = fleet.stream(stream.id()).await?;
    assert_eq!(adopted.status(), StreamStatus::Streaming);
    assert_eq!(adopted.assigned_agent(), Some(agent));
    fleet.check_load_counts().await
}
