//! Given steps for fleet control BDD scenarios.

use super::world::{FleetWorld, run_async};
use eyre::WrapErr;
use relayfleet::bus::domain::ReportedStatus;
use rstest_bdd_macros::given;

#[given(r#"an active agent "{name}" with {slots:u32} slots"#)]
fn active_agent(world: &mut FleetWorld, name: String, slots: u32) -> Result<(), eyre::Report> {
    let id = run_async(world.fleet.active_agent(&name, slots))
        .wrap_err("register active agent for scenario")?;
    world.agents.insert(name, id);
    Ok(())
}

#[given(r#"stream "{title}" is started"#)]
fn stream_started(world: &mut FleetWorld, title: String) -> Result<(), eyre::Report> {
    let stream = run_async(world.fleet.started_stream(&title)).wrap_err("start scenario stream")?;
    world.streams.insert(title, stream.id());
    Ok(())
}

#[given(r#"stream "{title}" is running"#)]
fn stream_running(world: &mut FleetWorld, title: String) -> Result<(), eyre::Report> {
    let stream = run_async(world.fleet.started_stream(&title)).wrap_err("start scenario stream")?;
    let agent = stream
        .assigned_agent()
        .ok_or_else(|| eyre::eyre!("stream {title} was queued instead of placed"))?;
    run_async(world.fleet.report(stream.id(), agent, ReportedStatus::Streaming))
        .wrap_err("confirm scenario stream")?;
    world.streams.insert(title, stream.id());
    Ok(())
}
