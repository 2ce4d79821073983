//! Entitlement check with a fixed deny list.

use crate::resilience::ports::{EntitlementCheck, EntitlementError};
use crate::stream::domain::OwnerId;
use async_trait::async_trait;
use std::collections::HashSet;

/// Treats every owner as entitled except the listed ones.
///
/// Used when no billing integration is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitlements {
    revoked: HashSet<OwnerId>,
}

impl StaticEntitlements {
    /// Entitles every owner.
    #[must_use]
    pub fn everyone() -> Self {
        Self::default()
    }

    /// Entitles every owner except `revoked`.
    #[must_use]
    pub fn revoking(revoked: impl IntoIterator<Item = OwnerId>) -> Self {
        Self {
            revoked: revoked.into_iter().collect(),
        }
    }
}

#[async_trait]
impl EntitlementCheck for StaticEntitlements {
    async fn is_entitled(&self, owner: OwnerId) -> Result<bool, EntitlementError> {
        Ok(!self.revoked.contains(&owner))
    }
}
