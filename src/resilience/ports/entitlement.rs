//! Billing-side entitlement lookup.

use crate::stream::domain::OwnerId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Answers whether a stream owner may still run streams.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitlementCheck: Send + Sync {
    /// Returns whether `owner` has an active entitlement.
    ///
    /// # Errors
    ///
    /// Returns [`EntitlementError::Unavailable`] when the billing side
    /// cannot answer.
    async fn is_entitled(&self, owner: OwnerId) -> Result<bool, EntitlementError>;
}

/// Errors returned by entitlement lookups.
#[derive(Debug, Clone, Error)]
pub enum EntitlementError {
    /// The lookup could not be made.
    #[error("entitlement lookup failed: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl EntitlementError {
    /// Wraps a lookup failure.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }
}
