//! Source file references.

use super::StreamDomainError;
use serde::{Deserialize, Serialize};

/// A source file the agent downloads before relaying.
///
/// `download_url` is a time-bounded pre-signed URL supplied by the upload
/// subsystem; the orchestrator only passes it along.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFile {
    /// Upload subsystem identifier.
    pub file_id: String,
    /// Original file name.
    pub filename: String,
    /// Pre-signed retrieval URL.
    pub download_url: String,
    /// Size in bytes.
    pub size: u64,
}

impl VideoFile {
    /// Creates a validated file reference.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidVideoFile`] when the identifier or
    /// the download URL is blank.
    pub fn new(
        file_id: impl Into<String>,
        filename: impl Into<String>,
        download_url: impl Into<String>,
        size: u64,
    ) -> Result<Self, StreamDomainError> {
        let file = Self {
            file_id: file_id.into(),
            filename: filename.into(),
            download_url: download_url.into(),
            size,
        };
        file.validate()?;
        Ok(file)
    }

    pub(crate) fn validate(&self) -> Result<(), StreamDomainError> {
        if self.file_id.trim().is_empty() || self.download_url.trim().is_empty() {
            return Err(StreamDomainError::InvalidVideoFile(self.filename.clone()));
        }
        Ok(())
    }
}
