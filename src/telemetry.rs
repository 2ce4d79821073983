//! Log subscriber setup.

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

/// Target for events that need an operator: agents marked failed and
/// streams disabled by the restart policy.
pub const ESCALATION: &str = "relayfleet::escalation";

/// Errors returned while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error(transparent)]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Builds the level filter from `RUST_LOG`, defaulting to `info`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn log_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if config.json {
        return Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false),
        );
    }
    Box::new(tracing_subscriber::fmt::layer().compact())
}

/// Installs the global subscriber: compact text or JSON lines, filtered by
/// `RUST_LOG`.
///
/// # Errors
///
/// Returns [`TelemetryError::AlreadyInstalled`] when called twice.
pub fn init(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let layer = log_layer(config).with_filter(env_filter());
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
