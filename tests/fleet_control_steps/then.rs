//! Then steps for fleet control BDD scenarios.

use super::world::{FleetWorld, run_async};
use relayfleet::fleet::domain::AgentStatus;
use relayfleet::stream::domain::StreamStatus;
use rstest_bdd_macros::then;

#[then(r#"stream "{title}" is "{status}""#)]
fn stream_status_is(world: &FleetWorld, title: String, status: String) -> Result<(), eyre::Report> {
    let expected = StreamStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let actual = run_async(world.fleet.status_of(world.stream(&title)?))?;
    if actual != expected {
        return Err(eyre::eyre!("expected stream {title} to be {expected}, found {actual}"));
    }
    Ok(())
}

#[then(r#"stream "{title}" is no longer scheduled"#)]
fn stream_not_scheduled(world: &FleetWorld, title: String) -> Result<(), eyre::Report> {
    let stream = run_async(world.fleet.stream(world.stream(&title)?))?;
    if stream.schedule_enabled() {
        return Err(eyre::eyre!("stream {title} is still scheduled"));
    }
    Ok(())
}

#[then(r#"agent "{name}" is "{status}""#)]
fn agent_status_is(world: &FleetWorld, name: String, status: String) -> Result<(), eyre::Report> {
    let expected = AgentStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected agent status in scenario: {err}"))?;
    let actual = run_async(world.fleet.agent(world.agent(&name)?))?.status();
    if actual != expected {
        return Err(eyre::eyre!("expected agent {name} to be {expected}, found {actual}"));
    }
    Ok(())
}

#[then(r#"agent "{name}" runs {count:u32} streams"#)]
fn agent_runs(world: &FleetWorld, name: String, count: u32) -> Result<(), eyre::Report> {
    let actual = run_async(world.fleet.agent(world.agent(&name)?))?.current_streams();
    if actual != count {
        return Err(eyre::eyre!("expected agent {name} to run {count} streams, found {actual}"));
    }
    Ok(())
}

#[then("every agent's load matches its streams")]
fn load_matches(world: &FleetWorld) -> Result<(), eyre::Report> {
    run_async(world.fleet.check_load_counts())
}
