//! Crash-restart decisions.

use super::{ErrorClass, PermanentKind};
use crate::clock::is_older_than;
use crate::config::RestartConfig;
use crate::stream::domain::Stream;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Why a crashed stream is disabled instead of restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// The error cannot be fixed by restarting.
    Permanent(PermanentKind),
    /// The stream crashed more often than allowed.
    CrashLoop {
        /// Crashes inside the window.
        crashes: usize,
    },
    /// The owner no longer has an active entitlement.
    NotEntitled,
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent(kind) => write!(f, "permanent error: {kind}"),
            Self::CrashLoop { crashes } => write!(f, "crashed {crashes} times in the crash window"),
            Self::NotEntitled => f.write_str("owner has no active entitlement"),
        }
    }
}

/// Outcome of the crash-restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Leave the stream in `Error`; automatic restarts are off.
    Hold,
    /// Turn the schedule off and leave the stream in `Error`.
    Disable(DisableReason),
    /// Start the stream again.
    Restart,
}

/// Decides what happens to a stream after an agent reports it crashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    crash_cap: usize,
    crash_window: Duration,
}

impl RestartPolicy {
    /// Creates a policy tolerating `crash_cap` crashes per `crash_window`.
    #[must_use]
    pub const fn new(crash_cap: usize, crash_window: Duration) -> Self {
        Self {
            crash_cap,
            crash_window,
        }
    }

    /// Creates the configured policy.
    #[must_use]
    pub fn from_config(config: &RestartConfig) -> Self {
        Self::new(
            usize::try_from(config.crash_cap).unwrap_or(usize::MAX),
            config.crash_window(),
        )
    }

    /// Returns the rolling crash window.
    #[must_use]
    pub const fn crash_window(&self) -> Duration {
        self.crash_window
    }

    /// Decides for `stream`, whose crash history already includes the
    /// latest crash.
    #[must_use]
    pub fn decide(
        &self,
        stream: &Stream,
        class: ErrorClass,
        entitled: bool,
        now: DateTime<Utc>,
    ) -> RestartDecision {
        if !stream.schedule_enabled() || stream.archived() {
            return RestartDecision::Hold;
        }
        if let Some(kind) = class.permanent() {
            return RestartDecision::Disable(DisableReason::Permanent(kind));
        }
        let crashes = stream
            .recent_crashes()
            .iter()
            .filter(|crash| !is_older_than(**crash, self.crash_window, now))
            .count();
        if crashes > self.crash_cap {
            return RestartDecision::Disable(DisableReason::CrashLoop { crashes });
        }
        if !entitled {
            return RestartDecision::Disable(DisableReason::NotEntitled);
        }
        RestartDecision::Restart
    }
}
