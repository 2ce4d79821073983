//! Circuit state for one relay endpoint.
//!
//! ```text
//! Closed --[failures >= threshold]--> Open
//! Open --[retry deadline passed]--> HalfOpen
//! HalfOpen --[probe succeeds]--> Closed
//! HalfOpen --[probe or stream fails]--> Open (new deadline)
//! ```

use crate::clock::delta;
use crate::stream::domain::RelayTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The network address a circuit guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Returns the endpoint a relay target pushes to.
    #[must_use]
    pub fn of(target: &RelayTarget) -> Self {
        Self {
            scheme: target.scheme(),
            host: target.host(),
            port: target.port(),
        }
    }

    /// Returns the host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the `scheme://host:port` key.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Circuit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitStatus {
    /// Attempts flow normally.
    Closed,
    /// Attempts are rejected until the retry deadline.
    Open,
    /// A probe is deciding whether to close.
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// Failure tracking for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    endpoint: Endpoint,
    status: CircuitStatus,
    failures: u32,
    retry_at: Option<DateTime<Utc>>,
}

impl CircuitState {
    /// Creates a closed circuit with no failures.
    #[must_use]
    pub const fn closed(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            status: CircuitStatus::Closed,
            failures: 0,
            retry_at: None,
        }
    }

    /// Returns the guarded endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the circuit position.
    #[must_use]
    pub const fn status(&self) -> CircuitStatus {
        self.status
    }

    /// Returns the failures counted since the last close.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Returns when an open circuit may be probed.
    #[must_use]
    pub const fn retry_at(&self) -> Option<DateTime<Utc>> {
        self.retry_at
    }

    /// Counts a failure and returns whether the circuit tripped open now.
    pub fn record_failure(&mut self, threshold: u32, open_for: Duration, at: DateTime<Utc>) -> bool {
        self.failures = self.failures.saturating_add(1);
        let trips = match self.status {
            CircuitStatus::Closed => self.failures >= threshold,
            CircuitStatus::HalfOpen => true,
            CircuitStatus::Open => false,
        };
        if trips {
            self.open(open_for, at);
        }
        trips
    }

    /// Closes the circuit and forgets past failures.
    pub const fn record_success(&mut self) {
        self.status = CircuitStatus::Closed;
        self.failures = 0;
        self.retry_at = None;
    }

    /// Returns whether attempts to the endpoint are allowed.
    #[must_use]
    pub const fn allows(&self) -> bool {
        matches!(self.status, CircuitStatus::Closed)
    }

    /// Returns whether an open circuit has reached its retry deadline.
    #[must_use]
    pub fn probe_due(&self, now: DateTime<Utc>) -> bool {
        self.status == CircuitStatus::Open && self.retry_at.is_none_or(|at| at <= now)
    }

    /// Moves an open circuit to half-open for probing.
    pub fn begin_probe(&mut self) {
        if self.status == CircuitStatus::Open {
            self.status = CircuitStatus::HalfOpen;
        }
    }

    fn open(&mut self, open_for: Duration, at: DateTime<Utc>) {
        self.status = CircuitStatus::Open;
        self.retry_at = Some(at + delta(open_for));
    }
}
