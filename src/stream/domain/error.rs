//! Error types for stream domain validation and parsing.

use super::StreamStatus;
use thiserror::Error;

/// Errors returned while constructing or mutating streams.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamDomainError {
    /// The title is empty after trimming.
    #[error("stream title must not be empty")]
    EmptyTitle,

    /// A stream needs at least one source file.
    #[error("stream must reference at least one video file")]
    NoVideoFiles,

    /// A file reference is missing its identifier or URL.
    #[error("video file '{0}' is missing an identifier or download URL")]
    InvalidVideoFile(String),

    /// A relay URL could not be parsed.
    #[error("invalid relay target '{0}'")]
    InvalidRelayTarget(String),

    /// The requested status change is not in the transition table.
    #[error("invalid stream status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: StreamStatus,
        /// Requested status.
        to: StreamStatus,
    },

    /// Running streams cannot be archived.
    #[error("stream in status {0} cannot be archived")]
    ArchiveWhileRunning(StreamStatus),
}

/// Error returned while parsing stream status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown stream status: {0}")]
pub struct ParseStreamStatusError(pub String);
