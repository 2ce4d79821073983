//! Classification of agent-reported relay errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that a restart cannot fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermanentKind {
    /// A source file is gone.
    MissingFile,
    /// The agent may not read a file or the ingest rejected credentials.
    Permission,
    /// A source file cannot be decoded.
    Corrupt,
    /// The relay ran out of memory.
    OutOfMemory,
}

impl fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingFile => "missing file",
            Self::Permission => "permission denied",
            Self::Corrupt => "corrupt media",
            Self::OutOfMemory => "out of memory",
        })
    }
}

/// What an agent-reported error says about its cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Retrying will not help.
    Permanent(PermanentKind),
    /// The relay endpoint refused or dropped the push.
    Endpoint,
    /// Anything else.
    Transient,
}

const MISSING_FILE: &[&str] = &[
    "no such file",
    "file not found",
    "does not exist",
    "404 not found",
    "server returned 404",
];
const PERMISSION: &[&str] = &[
    "permission denied",
    "access denied",
    "forbidden",
    "server returned 403",
    "unauthorized",
];
const CORRUPT: &[&str] = &[
    "invalid data found",
    "moov atom not found",
    "corrupt",
    "could not find codec parameters",
    "invalid nal unit",
];
const OUT_OF_MEMORY: &[&str] = &["out of memory", "cannot allocate memory", "oom-kill", "oom killer"];
const ENDPOINT: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "broken pipe",
    "network is unreachable",
    "handshake",
    "rtmp_connect",
    "failed to connect",
    "end of file",
];

impl ErrorClass {
    /// Classifies an error message reported by an agent.
    ///
    /// Permanent kinds are checked before endpoint failures, so a
    /// "403 Forbidden" from an ingest counts as a permission problem.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let text = message.to_ascii_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|needle| text.contains(needle));

        if mentions(MISSING_FILE) {
            Self::Permanent(PermanentKind::MissingFile)
        } else if mentions(PERMISSION) {
            Self::Permanent(PermanentKind::Permission)
        } else if mentions(CORRUPT) {
            Self::Permanent(PermanentKind::Corrupt)
        } else if mentions(OUT_OF_MEMORY) {
            Self::Permanent(PermanentKind::OutOfMemory)
        } else if mentions(ENDPOINT) {
            Self::Endpoint
        } else {
            Self::Transient
        }
    }

    /// Returns the permanent kind, if any.
    #[must_use]
    pub const fn permanent(self) -> Option<PermanentKind> {
        match self {
            Self::Permanent(kind) => Some(kind),
            Self::Endpoint | Self::Transient => None,
        }
    }
}
