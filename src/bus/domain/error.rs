//! Wire encoding errors.

use std::sync::Arc;
use thiserror::Error;

/// Errors returned while encoding or decoding bus payloads.
#[derive(Debug, Clone, Error)]
pub enum WireError {
    /// The payload is not valid JSON for the expected message, or carries an
    /// unknown tag.
    #[error("malformed message: {0}")]
    Malformed(Arc<serde_json::Error>),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(Arc<serde_json::Error>),
}

impl WireError {
    pub(crate) fn malformed(err: serde_json::Error) -> Self {
        Self::Malformed(Arc::new(err))
    }

    pub(crate) fn encode(err: serde_json::Error) -> Self {
        Self::Encode(Arc::new(err))
    }
}
