//! TCP connect probe.

use crate::resilience::{domain::Endpoint, ports::EndpointProbe};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Considers an endpoint healthy when a TCP connection opens in time.
#[derive(Debug, Clone, Copy)]
pub struct TcpEndpointProbe {
    timeout: Duration,
}

impl TcpEndpointProbe {
    /// Creates a probe giving up after `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpEndpointProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl EndpointProbe for TcpEndpointProbe {
    async fn probe(&self, endpoint: &Endpoint) -> bool {
        let address = (endpoint.host(), endpoint.port());
        match tokio::time::timeout(self.timeout, TcpStream::connect(address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                debug!(endpoint = %endpoint, error = %err, "endpoint probe refused");
                false
            }
            Err(_) => {
                debug!(endpoint = %endpoint, "endpoint probe timed out");
                false
            }
        }
    }
}
