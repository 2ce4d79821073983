//! When steps for fleet control BDD scenarios.

use super::world::{FleetWorld, run_async};
use eyre::WrapErr;
use relayfleet::bus::domain::ReportedStatus;
use rstest_bdd_macros::when;
use std::time::Duration;

#[when("{seconds:u64} seconds pass")]
fn time_passes(world: &mut FleetWorld, seconds: u64) {
    world.fleet.clock.advance(Duration::from_secs(seconds));
}

#[when("the sweeper runs")]
fn sweeper_runs(world: &mut FleetWorld) -> Result<(), eyre::Report> {
    run_async(world.fleet.sweeper().sweep()).wrap_err("run transient sweep")?;
    Ok(())
}

#[when("the partition monitor runs")]
fn partition_monitor_runs(world: &mut FleetWorld) -> Result<(), eyre::Report> {
    run_async(world.fleet.partition_monitor().check()).wrap_err("run partition check")?;
    Ok(())
}

#[when(r#"stream "{title}" stops"#)]
fn stream_stops(world: &mut FleetWorld, title: String) -> Result<(), eyre::Report> {
    let id = world.stream(&title)?;
    let agent = world.bound_agent(&title)?;
    run_async(world.fleet.lifecycle.stop(id)).wrap_err("stop scenario stream")?;
    run_async(world.fleet.report(id, agent, ReportedStatus::Stopped))
        .wrap_err("confirm stop")?;
    run_async(world.fleet.lifecycle.drain_queue()).wrap_err("drain queue")?;
    Ok(())
}

#[when(r#""{agent}" reports stream "{title}" as "{status}""#)]
fn agent_reports(
    world: &mut FleetWorld,
    agent: String,
    title: String,
    status: String,
) -> Result<(), eyre::Report> {
    let reported: ReportedStatus = serde_json::from_value(serde_json::Value::String(status))
        .wrap_err("parse reported status")?;
    let agent_id = world.agent(&agent)?;
    let id = world.stream(&title)?;
    run_async(world.fleet.report(id, agent_id, reported)).wrap_err("deliver status report")?;
    Ok(())
}

#[when(r#"stream "{title}" crashes {times:usize} times"#)]
fn stream_crashes(world: &mut FleetWorld, title: String, times: usize) -> Result<(), eyre::Report> {
    let id = world.stream(&title)?;
    for _ in 0..times {
        let agent = world.bound_agent(&title)?;
        run_async(world.fleet.report(id, agent, ReportedStatus::Streaming))
            .wrap_err("confirm restarted relay")?;
        world.fleet.clock.advance(Duration::from_secs(10));
        run_async(world.fleet.report_crash(id, agent, "ffmpeg exited with code 1"))
            .wrap_err("deliver crash report")?;
    }
    Ok(())
}

#[when(r#""{agent}" heartbeats with stream "{title}""#)]
fn agent_heartbeats(world: &mut FleetWorld, agent: String, title: String) -> Result<(), eyre::Report> {
    let agent_id = world.agent(&agent)?;
    let id = world.stream(&title)?;
    run_async(world.fleet.heartbeat(agent_id, vec![id])).wrap_err("deliver heartbeat")?;
    Ok(())
}
