//! Relay endpoint reachability.

use crate::resilience::domain::Endpoint;
use async_trait::async_trait;

/// Checks whether a relay endpoint accepts connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// Returns `true` when `endpoint` is reachable.
    async fn probe(&self, endpoint: &Endpoint) -> bool;
}
