//! Crash restarts and partition recovery.

use crate::test_helpers::Fleet;
use relayfleet::bus::domain::ReportedStatus;
use relayfleet::fleet::domain::AgentStatus;
use relayfleet::reconcile::services::StatusOutcome;
use relayfleet::resilience::domain::DisableReason;
use relayfleet::stream::domain::StreamStatus;
use rstest::{fixture, rstest};
use std::time::Duration;

#[fixture]
fn fleet() -> Fleet {
    Fleet::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn crash_loop_is_capped(fleet: Fleet) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 1).await?;
    let stream = fleet.started_stream("flaky").await?;

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        fleet.report(stream.id(), agent, ReportedStatus::Streaming).await?;
        fleet.clock.advance(Duration::from_secs(10));
        outcomes.push(fleet.report_crash(stream.id(), agent, "ffmpeg exited with code 1").await?);
    }

    let (last, restarts) = outcomes
        .split_last()
        .ok_or_else(|| eyre::eyre!("no crash outcomes"))?;
    assert_eq!(restarts, &[StatusOutcome::Restarted; 3]);
    assert!(matches!(
        last,
        StatusOutcome::Disabled(DisableReason::CrashLoop { .. })
    ));
    let disabled = fleet.stream(stream.id()).await?;
    assert_eq!(disabled.status(), StreamStatus::Error);
    assert!(!disabled.schedule_enabled());
    fleet.check_load_counts().await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn bad_stream_key_is_not_restarted(fleet: Fleet) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 1).await?;
    let stream = fleet.started_stream("misconfigured").await?;

    let outcome = fleet
        .report_crash(stream.id(), agent, "Server returned 403 Forbidden (access denied)")
        .await?;

    assert!(matches!(outcome, StatusOutcome::Disabled(_)));
    assert_eq!(fleet.agent(agent).await?.current_streams(), 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn partitioned_agent_gets_its_streams_back(fleet: Fleet) -> eyre::Result<()> {
    let agent = fleet.active_agent("relay-a", 2).await?;
    let stream = fleet.started_stream("show").await?;
    fleet.report(stream.id(), agent, ReportedStatus::Streaming).await?;

    fleet.clock.advance(Duration::from_secs(91));
    let report = fleet.partition_monitor().check().await?;
    assert_eq!(report.partitioned, 1);
    assert_eq!(fleet.agent(agent).await?.status(), AgentStatus::Partitioned);
    assert_eq!(fleet.status_of(stream.id()).await?, StreamStatus::Partitioned);
    assert_eq!(fleet.agent(agent).await?.current_streams(), 0);

    let outcome = fleet.heartbeat(agent, vec![stream.id()]).await?;

    assert!(outcome.recovered);
    assert_eq!(outcome.restored, 1);
    assert_eq!(fleet.agent(agent).await?.status(), AgentStatus::Active);
    assert_eq!(fleet.status_of(stream.id()).await?, StreamStatus::Streaming);
    fleet.check_load_counts().await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lost_agent_streams_move_to_a_spare(fleet: Fleet) -> eyre::Result<()> {
    let lost = fleet.active_agent("relay-a", 2).await?;
    let stream = fleet.started_stream("show").await?;
    assert_eq!(stream.assigned_agent(), Some(lost));
    fleet.report(stream.id(), lost, ReportedStatus::Streaming).await?;
    fleet.clock.advance(Duration::from_secs(91));
    fleet.partition_monitor().check().await?;
    let spare = fleet.active_agent("relay-b", 2).await?;

    fleet.clock.advance(Duration::from_secs(601));
    fleet.heartbeat(spare, Vec::new()).await?;
    let report = fleet.partition_monitor().check().await?;
    fleet.lifecycle.drain_queue().await?;

    assert_eq!(report.failed, 1);
    assert_eq!(fleet.agent(lost).await?.status(), AgentStatus::Failed);
    let moved = fleet.stream(stream.id()).await?;
    assert_eq!(moved.status(), StreamStatus::Starting);
    assert_eq!(moved.assigned_agent(), Some(spare));
    fleet.check_load_counts().await
}
