//! Time helpers shared by the orchestrator.
//!
//! Services read time exclusively through [`mockable::Clock`]. This module
//! adds a manually-advanced clock for deterministic sweeps and a conversion
//! helper from configuration durations to `chrono` deltas.

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Converts a configuration [`Duration`] into a [`TimeDelta`].
///
/// Durations too large for `chrono` saturate to [`TimeDelta::MAX`].
#[must_use]
pub fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Returns whether `at` lies further than `window` before `now`.
#[must_use]
pub fn is_older_than(at: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(at) > delta(window)
}

/// Clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one clone to the
/// services and advance another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Creates a clock frozen at the current wall-clock time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Moves the clock forward.
    pub fn advance(&self, step: Duration) {
        let mut guard = self
            .now
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += delta(step);
    }

    /// Jumps the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut guard = self
            .now
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self
            .now
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_instant() {
        let clock = ManualClock::starting_now();
        let handle = clock.clone();
        let before = clock.utc();

        handle.advance(Duration::from_secs(30));

        assert_eq!(clock.utc() - before, TimeDelta::seconds(30));
    }

    #[test]
    fn is_older_than_is_strict() {
        let now = Utc::now();
        let at = now - TimeDelta::seconds(60);

        assert!(!is_older_than(at, Duration::from_secs(60), now));
        assert!(is_older_than(at, Duration::from_secs(59), now));
    }
}
