//! Orchestrator configuration.
//!
//! Configuration is layered with `figment`: compiled-in defaults, then an
//! optional TOML file, then `RELAYFLEET_`-prefixed environment variables
//! (`RELAYFLEET_TIMEOUTS__STARTING_SECS=90`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "RELAYFLEET_";

/// Errors returned while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong shape.
    #[error("failed to load configuration: {0}")]
    Load(Box<figment::Error>),

    /// The merged configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// `PostgreSQL` connection string; in-memory stores are used when unset.
    pub database_url: Option<String>,
    /// Wall-clock thresholds checked by the sweeps.
    pub timeouts: TimeoutConfig,
    /// Periods of the background workers.
    pub intervals: IntervalConfig,
    /// Transport between the control plane and its agents.
    pub bus: BusConfig,
    /// Command publish retry policy.
    pub dispatch: DispatchConfig,
    /// Relay endpoint circuit breaker policy.
    pub circuit: CircuitConfig,
    /// Crash-restart policy.
    pub restart: RestartConfig,
    /// Event consumption settings.
    pub reconcile: ReconcileConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl OrchestratorConfig {
    /// Loads configuration from defaults, an optional TOML file and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a provider fails and
    /// [`ConfigError::Invalid`] when validation rejects the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = path {
            figment = figment.merge(Toml::file(file));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile.shards == 0 {
            return Err(ConfigError::Invalid(
                "reconcile.shards must be at least 1".to_owned(),
            ));
        }
        if self.dispatch.attempts == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.attempts must be at least 1".to_owned(),
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit.failure_threshold must be at least 1".to_owned(),
            ));
        }
        if self.timeouts.partition_after_secs >= self.timeouts.agent_liveness_secs {
            return Err(ConfigError::Invalid(format!(
                "timeouts.partition_after_secs ({}) must be shorter than timeouts.agent_liveness_secs ({})",
                self.timeouts.partition_after_secs, self.timeouts.agent_liveness_secs
            )));
        }
        if self.timeouts.partition_after_secs >= self.timeouts.streaming_silence_secs {
            return Err(ConfigError::Invalid(format!(
                "timeouts.partition_after_secs ({}) must be shorter than timeouts.streaming_silence_secs ({})",
                self.timeouts.partition_after_secs, self.timeouts.streaming_silence_secs
            )));
        }
        if self.bus.transport == BusTransport::Websocket
            && self.bus.listen_addr.parse::<SocketAddr>().is_err()
        {
            return Err(ConfigError::Invalid(format!(
                "bus.listen_addr ({}) is not a socket address",
                self.bus.listen_addr
            )));
        }
        let periods = [
            ("sweep_secs", self.intervals.sweep_secs),
            ("partition_check_secs", self.intervals.partition_check_secs),
            ("zombie_check_secs", self.intervals.zombie_check_secs),
            ("circuit_probe_secs", self.intervals.circuit_probe_secs),
            ("queue_drain_secs", self.intervals.queue_drain_secs),
            ("handover_poll_millis", self.intervals.handover_poll_millis),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, period)| *period == 0) {
            return Err(ConfigError::Invalid(format!(
                "intervals.{name} must be positive"
            )));
        }
        Ok(())
    }
}

/// Thresholds used to detect stuck or silent entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum time a stream may stay `STARTING`.
    pub starting_secs: u64,
    /// Maximum time a stream may stay `STOPPING`.
    pub stopping_secs: u64,
    /// Maximum silence for a `STREAMING` stream.
    pub streaming_silence_secs: u64,
    /// Heartbeat age after which an agent's streams are failed.
    pub agent_liveness_secs: u64,
    /// Heartbeat age after which an agent is marked partitioned.
    pub partition_after_secs: u64,
    /// Time a partitioned agent has to come back before it is failed.
    pub partition_recovery_secs: u64,
    /// Time allowed for an agent to shed its streams before an update.
    pub handover_drain_secs: u64,
    /// Ceiling for any non-terminal update status.
    pub update_ceiling_secs: u64,
    /// Time allowed for an updated agent to heartbeat again.
    pub update_verify_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            starting_secs: 120,
            stopping_secs: 60,
            streaming_silence_secs: 180,
            agent_liveness_secs: 300,
            partition_after_secs: 90,
            partition_recovery_secs: 600,
            handover_drain_secs: 120,
            update_ceiling_secs: 1800,
            update_verify_secs: 120,
        }
    }
}

impl TimeoutConfig {
    /// Maximum `STARTING` duration.
    #[must_use]
    pub const fn starting(&self) -> Duration {
        Duration::from_secs(self.starting_secs)
    }

    /// Maximum `STOPPING` duration.
    #[must_use]
    pub const fn stopping(&self) -> Duration {
        Duration::from_secs(self.stopping_secs)
    }

    /// Maximum `STREAMING` silence.
    #[must_use]
    pub const fn streaming_silence(&self) -> Duration {
        Duration::from_secs(self.streaming_silence_secs)
    }

    /// Dead-agent liveness window.
    #[must_use]
    pub const fn agent_liveness(&self) -> Duration {
        Duration::from_secs(self.agent_liveness_secs)
    }

    /// Partition detection window.
    #[must_use]
    pub const fn partition_after(&self) -> Duration {
        Duration::from_secs(self.partition_after_secs)
    }

    /// Partition recovery window.
    #[must_use]
    pub const fn partition_recovery(&self) -> Duration {
        Duration::from_secs(self.partition_recovery_secs)
    }

    /// Handover drain timeout.
    #[must_use]
    pub const fn handover_drain(&self) -> Duration {
        Duration::from_secs(self.handover_drain_secs)
    }

    /// Update status ceiling.
    #[must_use]
    pub const fn update_ceiling(&self) -> Duration {
        Duration::from_secs(self.update_ceiling_secs)
    }

    /// Post-update liveness verification timeout.
    #[must_use]
    pub const fn update_verify(&self) -> Duration {
        Duration::from_secs(self.update_verify_secs)
    }
}

/// Background worker periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// Transient-state sweep period.
    pub sweep_secs: u64,
    /// Partition monitor period.
    pub partition_check_secs: u64,
    /// Zombie reaper period.
    pub zombie_check_secs: u64,
    /// Circuit probe period.
    pub circuit_probe_secs: u64,
    /// Fallback queue-drain period.
    pub queue_drain_secs: u64,
    /// Handover polling period.
    pub handover_poll_millis: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            sweep_secs: 15,
            partition_check_secs: 15,
            zombie_check_secs: 60,
            circuit_probe_secs: 30,
            queue_drain_secs: 30,
            handover_poll_millis: 1_000,
        }
    }
}

impl IntervalConfig {
    /// Transient-state sweep period.
    #[must_use]
    pub const fn sweep(&self) -> Duration {
        Duration::from_secs(self.sweep_secs)
    }

    /// Partition monitor period.
    #[must_use]
    pub const fn partition_check(&self) -> Duration {
        Duration::from_secs(self.partition_check_secs)
    }

    /// Zombie reaper period.
    #[must_use]
    pub const fn zombie_check(&self) -> Duration {
        Duration::from_secs(self.zombie_check_secs)
    }

    /// Circuit probe period.
    #[must_use]
    pub const fn circuit_probe(&self) -> Duration {
        Duration::from_secs(self.circuit_probe_secs)
    }

    /// Fallback queue-drain period.
    #[must_use]
    pub const fn queue_drain(&self) -> Duration {
        Duration::from_secs(self.queue_drain_secs)
    }

    /// Handover polling period.
    #[must_use]
    pub const fn handover_poll(&self) -> Duration {
        Duration::from_millis(self.handover_poll_millis)
    }
}

/// How commands and agent events travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusTransport {
    /// Agents run inside this process.
    #[default]
    Memory,
    /// Agents connect to a WebSocket gateway on `bus.listen_addr`.
    Websocket,
}

/// Agent transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Selected transport.
    pub transport: BusTransport,
    /// Gateway bind address for the WebSocket transport.
    pub listen_addr: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            transport: BusTransport::Memory,
            listen_addr: "0.0.0.0:9480".to_owned(),
        }
    }
}

/// Publish retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Total publish attempts per command.
    pub attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff_millis: u64,
    /// Upper bound for the doubling delay.
    pub max_backoff_millis: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff_millis: 200,
            max_backoff_millis: 2_000,
        }
    }
}

impl DispatchConfig {
    /// Delay before the second attempt.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_millis)
    }

    /// Upper bound for the doubling delay.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_millis)
    }
}

/// Circuit breaker policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures that trip a circuit.
    pub failure_threshold: u32,
    /// Time an open circuit rejects attempts before probing.
    pub open_secs: u64,
    /// Groups of interchangeable ingest base URLs.
    ///
    /// A stream whose target starts with one member of a group may fail
    /// over to any other member, keeping the remainder of its URL.
    pub fallback_groups: Vec<Vec<String>>,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_secs: 60,
            fallback_groups: Vec::new(),
        }
    }
}

impl CircuitConfig {
    /// Open-state duration.
    #[must_use]
    pub const fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_secs)
    }
}

/// Crash-restart policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Crashes tolerated inside the window before the stream is disabled.
    pub crash_cap: u32,
    /// Rolling crash window.
    pub crash_window_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            crash_cap: 3,
            crash_window_secs: 300,
        }
    }
}

impl RestartConfig {
    /// Rolling crash window.
    #[must_use]
    pub const fn crash_window(&self) -> Duration {
        Duration::from_secs(self.crash_window_secs)
    }
}

/// Event consumption settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Number of reconciliation shards consuming agent events.
    pub shards: usize,
    /// Expiry of the cached per-agent reported stream set.
    pub heartbeat_cache_ttl_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            shards: 4,
            heartbeat_cache_ttl_secs: 30,
        }
    }
}

impl ReconcileConfig {
    /// Heartbeat cache expiry.
    #[must_use]
    pub const fn heartbeat_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_cache_ttl_secs)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}
