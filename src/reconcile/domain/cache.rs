//! Short-lived memory of each agent's last reported stream set.

use crate::clock::is_older_than;
use crate::fleet::domain::AgentId;
use crate::stream::domain::StreamId;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

#[derive(Debug, Clone)]
struct CachedReport {
    streams: BTreeSet<StreamId>,
    at: DateTime<Utc>,
}

/// Per-agent stream sets from the latest heartbeat, forgotten after `ttl`.
///
/// The cache is advisory; readers treat an expired or missing entry as
/// "unknown" and skip decisions that need it.
#[derive(Debug)]
pub struct HeartbeatCache {
    ttl: Duration,
    reports: RwLock<HashMap<AgentId, CachedReport>>,
}

impl HeartbeatCache {
    /// Creates an empty cache whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            reports: RwLock::new(HashMap::new()),
        }
    }

    /// Stores the set `agent` reported at `at`.
    pub fn record(&self, agent: AgentId, streams: impl IntoIterator<Item = StreamId>, at: DateTime<Utc>) {
        let report = CachedReport {
            streams: streams.into_iter().collect(),
            at,
        };
        self.reports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent, report);
    }

    /// Returns the set `agent` last reported, unless it is older than the
    /// expiry at `now`.
    #[must_use]
    pub fn reported(&self, agent: AgentId, now: DateTime<Utc>) -> Option<BTreeSet<StreamId>> {
        let reports = self.reports.read().unwrap_or_else(PoisonError::into_inner);
        reports
            .get(&agent)
            .filter(|report| !is_older_than(report.at, self.ttl, now))
            .map(|report| report.streams.clone())
    }

    /// Returns when `agent` last reported, regardless of expiry.
    #[must_use]
    pub fn reported_at(&self, agent: AgentId) -> Option<DateTime<Utc>> {
        let reports = self.reports.read().unwrap_or_else(PoisonError::into_inner);
        reports.get(&agent).map(|report| report.at)
    }

    /// Drops the entry of `agent`.
    pub fn forget(&self, agent: AgentId) {
        self.reports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&agent);
    }
}
