//! Shared test helpers for `PostgreSQL` integration tests.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use pg_embedded_setup_unpriv::TestCluster;
use relayfleet::clock::ManualClock;
use relayfleet::fleet::{
    adapters::postgres::PostgresAgentRegistry,
    domain::{Agent, AgentCapabilities, AgentId, AgentName, AgentStatus},
    ports::AgentRegistry,
};
use relayfleet::persistence::{self, PgPool};
use relayfleet::stream::{
    adapters::postgres::{PostgresStreamRepository, PostgresWaitQueue},
    domain::{NewStreamParams, OwnerId, RelayTarget, Stream, VideoFile},
    ports::StreamRepository,
};
use mockable::Clock;
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;

/// SQL creating the agent, stream and queue tables.
pub const CREATE_FLEET_TABLES_SQL: &str =
    include_str!("../../migrations/2026-10-01-000000_create_fleet_tables/up.sql");

/// Template database name for pre-migrated schema.
pub const TEMPLATE_DB: &str = "relayfleet_test_template";

/// Creates a multi-threaded runtime so spawned tasks race for real.
///
/// # Panics
///
/// Panics when the runtime cannot be built.
#[must_use]
pub fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("tokio runtime")
}

/// Ensures the template database exists with the schema applied.
///
/// # Errors
///
/// Returns the template creation or migration failure.
pub fn ensure_template(cluster: &TestCluster) -> eyre::Result<()> {
    cluster
        .ensure_template_exists(TEMPLATE_DB, |db_name| {
            let url = cluster.connection().database_url(db_name);
            let mut conn = PgConnection::establish(&url).map_err(|e| eyre::eyre!("{e}"))?;
            conn.batch_execute(CREATE_FLEET_TABLES_SQL)
                .map_err(|e| eyre::eyre!("{e}"))?;
            Ok(())
        })
        .map_err(|e| eyre::eyre!("template setup failed: {e}"))
}

/// A database cloned from the template, dropped with the guard.
pub struct FleetDatabase<'a> {
    cluster: &'a TestCluster,
    name: String,
    /// Pool connected to the database.
    pub pool: PgPool,
}

impl<'a> FleetDatabase<'a> {
    /// Clones the template into a fresh database.
    ///
    /// # Errors
    ///
    /// Returns the database creation or pool failure.
    pub fn create(cluster: &'a TestCluster, prefix: &str) -> eyre::Result<Self> {
        ensure_template(cluster)?;
        let name = format!("{prefix}_{}", Uuid::new_v4().simple());
        cluster
            .create_database_from_template(name.as_str(), TEMPLATE_DB)
            .map_err(|e| eyre::eyre!("create {name}: {e}"))?;
        let pool = persistence::connect(&cluster.connection().database_url(&name))?;
        Ok(Self {
            cluster,
            name,
            pool,
        })
    }

    /// Returns an agent registry over this database.
    #[must_use]
    pub fn agents(&self) -> Arc<PostgresAgentRegistry> {
        Arc::new(PostgresAgentRegistry::new(self.pool.clone()))
    }

    /// Returns a stream repository over this database.
    #[must_use]
    pub fn streams(&self) -> Arc<PostgresStreamRepository> {
        Arc::new(PostgresStreamRepository::new(self.pool.clone()))
    }

    /// Returns a wait queue over this database.
    #[must_use]
    pub fn queue(&self) -> Arc<PostgresWaitQueue> {
        Arc::new(PostgresWaitQueue::new(self.pool.clone()))
    }
}

impl Drop for FleetDatabase<'_> {
    fn drop(&mut self) {
        drop(self.cluster.drop_database(self.name.as_str()));
    }
}

/// Registers an agent and moves it to `Active`.
///
/// # Errors
///
/// Returns the validation or registry failure.
pub async fn active_agent(
    registry: &impl AgentRegistry,
    clock: &ManualClock,
    name: &str,
    max_streams: u32,
) -> eyre::Result<AgentId> {
    let agent = Agent::new(
        AgentName::new(name)?,
        "198.51.100.30",
        max_streams,
        AgentCapabilities::new(),
        clock,
    )?;
    registry.register(&agent).await?;
    for status in [AgentStatus::Provisioning, AgentStatus::Active] {
        if !registry
            .transition_status(agent.id(), &AgentStatus::ALL, status, clock.utc())
            .await?
        {
            return Err(eyre::eyre!("agent {name} did not reach {status}"));
        }
    }
    Ok(agent.id())
}

/// Stores a new inactive stream.
///
/// # Errors
///
/// Returns the validation or persistence failure.
pub async fn stored_stream(
    streams: &impl StreamRepository,
    clock: &ManualClock,
    title: &str,
) -> eyre::Result<Stream> {
    let stream = Stream::new(
        NewStreamParams {
            owner: OwnerId::from_uuid(Uuid::new_v4()),
            title: title.to_owned(),
            video_files: vec![VideoFile::new(
                "file-1",
                "intro.mp4",
                "https://media.example.com/files/file-1",
                1_048_576,
            )?],
            primary_target: RelayTarget::parse("rtmp://a.rtmp.example.com/live2/key-1")?,
            push_targets: Vec::new(),
            loop_playback: false,
        },
        clock,
    )?;
    streams.create(&stream).await?;
    Ok(stream)
}
