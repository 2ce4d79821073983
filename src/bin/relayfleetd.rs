//! Runs the relay fleet control plane.
//!
//! Usage:
//!
//! ```text
//! relayfleetd [--config relayfleet.toml]
//! ```
//!
//! Stores live in `PostgreSQL` when `database_url` is configured and in
//! memory otherwise. With `bus.transport = "websocket"` remote agents
//! connect to a gateway on `bus.listen_addr`. The process runs until
//! interrupted.

use clap::Parser;
use mockable::DefaultClock;
use relayfleet::bus::{
    adapters::{InMemoryCommandBus, WebSocketGateway},
    ports::CommandBus,
};
use relayfleet::config::{BusTransport, OrchestratorConfig};
use relayfleet::daemon::{Collaborators, Daemon};
use relayfleet::fleet::{
    adapters::{memory::InMemoryAgentRegistry, postgres::PostgresAgentRegistry},
    ports::AgentRegistry,
};
use relayfleet::persistence;
use relayfleet::resilience::adapters::{InMemoryCircuitStore, StaticEntitlements, TcpEndpointProbe};
use relayfleet::stream::{
    adapters::{
        memory::{InMemoryStreamRepository, InMemoryWaitQueue},
        postgres::{PostgresStreamRepository, PostgresWaitQueue},
    },
    ports::{StreamRepository, WaitQueue},
};
use relayfleet::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "relayfleetd", about = "Relay fleet control plane")]
struct Cli {
    /// TOML configuration file; `RELAYFLEET_*` variables override it.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = OrchestratorConfig::load(cli.config.as_deref())?;
    telemetry::init(&config.logging)?;
    let bus = Arc::new(InMemoryCommandBus::new());

    match config.database_url.clone() {
        Some(url) => {
            let pool = persistence::connect(&url)?;
            persistence::apply_schema(&pool).await?;
            info!("using PostgreSQL stores");
            serve(
                config,
                Arc::new(PostgresAgentRegistry::new(pool.clone())),
                Arc::new(PostgresStreamRepository::new(pool.clone())),
                Arc::new(PostgresWaitQueue::new(pool)),
                bus,
            )
            .await
        }
        None => {
            info!("no database configured; using in-memory stores");
            serve(
                config,
                Arc::new(InMemoryAgentRegistry::new()),
                Arc::new(InMemoryStreamRepository::new()),
                Arc::new(InMemoryWaitQueue::new()),
                bus,
            )
            .await
        }
    }
}

async fn serve<A, S, Q, B>(
    config: OrchestratorConfig,
    agents: Arc<A>,
    streams: Arc<S>,
    queue: Arc<Q>,
    bus: Arc<B>,
) -> Result<(), BoxError>
where
    A: AgentRegistry + 'static,
    S: StreamRepository + 'static,
    Q: WaitQueue + 'static,
    B: CommandBus + 'static,
{
    let bus_config = config.bus.clone();
    let collaborators = Collaborators {
        circuits: Arc::new(InMemoryCircuitStore::new()),
        probe: Arc::new(TcpEndpointProbe::default()),
        entitlements: Arc::new(StaticEntitlements::everyone()),
    };
    let daemon = Daemon::new(
        config,
        agents,
        streams,
        queue,
        Arc::clone(&bus),
        Arc::new(DefaultClock),
        collaborators,
    );
    let handle = daemon.start(CancellationToken::new()).await?;
    let gateway = match bus_config.transport {
        BusTransport::Memory => None,
        BusTransport::Websocket => {
            let listener = WebSocketGateway::bind(&bus_config.listen_addr, bus).await?;
            Some(tokio::spawn(listener.run(handle.cancel_token().clone())))
        }
    };
    tokio::signal::ctrl_c().await?;
    info!("interrupt received; shutting down");
    handle.shutdown().await;
    if let Some(task) = gateway {
        task.await?;
    }
    Ok(())
}
