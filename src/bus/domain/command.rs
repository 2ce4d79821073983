//! Agent-bound commands.

use super::WireError;
use crate::stream::domain::{Stream, StreamId, VideoFile};
use serde::{Deserialize, Serialize};

/// A command for exactly one agent.
///
/// Encoded as `{"command": "<TAG>", "config": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "config", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentCommand {
    /// Download the files and start relaying.
    StartStream(StreamConfig),
    /// Stop the relay process.
    StopStream(StreamTarget),
    /// Swap files or targets without interrupting the relay.
    UpdateStream(StreamConfig),
    /// Delete the downloaded files of a stream.
    CleanupFiles(StreamTarget),
    /// Kill relays the control plane does not expect on this agent.
    CleanupZombies(ZombieSweep),
}

/// Full description of a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stream identifier.
    pub id: StreamId,
    /// Ordered source files.
    pub video_files: Vec<VideoFile>,
    /// Main ingest URL.
    pub rtmp_url: String,
    /// Extra ingest URLs.
    #[serde(default)]
    pub push_urls: Vec<String>,
    /// Restart playback when the last file ends.
    #[serde(rename = "loop", default)]
    pub loop_playback: bool,
}

impl StreamConfig {
    /// Builds the relay description of `stream`.
    #[must_use]
    pub fn from_stream(stream: &Stream) -> Self {
        Self {
            id: stream.id(),
            video_files: stream.video_files().to_vec(),
            rtmp_url: stream.primary_target().as_str().to_owned(),
            push_urls: stream
                .push_targets()
                .iter()
                .map(|target| target.as_str().to_owned())
                .collect(),
            loop_playback: stream.loop_playback(),
        }
    }
}

/// Names one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTarget {
    /// Stream identifier.
    pub id: StreamId,
}

/// Streams an agent should kill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZombieSweep {
    /// Unexpected streams.
    pub stream_ids: Vec<StreamId>,
}

impl AgentCommand {
    /// Start command for `stream`.
    #[must_use]
    pub fn start(stream: &Stream) -> Self {
        Self::StartStream(StreamConfig::from_stream(stream))
    }

    /// Stop command for `id`.
    #[must_use]
    pub const fn stop(id: StreamId) -> Self {
        Self::StopStream(StreamTarget { id })
    }

    /// Update command for `stream`.
    #[must_use]
    pub fn update(stream: &Stream) -> Self {
        Self::UpdateStream(StreamConfig::from_stream(stream))
    }

    /// Returns the wire tag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::StartStream(_) => "START_STREAM",
            Self::StopStream(_) => "STOP_STREAM",
            Self::UpdateStream(_) => "UPDATE_STREAM",
            Self::CleanupFiles(_) => "CLEANUP_FILES",
            Self::CleanupZombies(_) => "CLEANUP_ZOMBIES",
        }
    }

    /// Returns the stream the command is about, when it names exactly one.
    #[must_use]
    pub const fn stream_id(&self) -> Option<StreamId> {
        match self {
            Self::StartStream(config) | Self::UpdateStream(config) => Some(config.id),
            Self::StopStream(target) | Self::CleanupFiles(target) => Some(target.id),
            Self::CleanupZombies(_) => None,
        }
    }

    /// Serializes the command to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Encode`] when serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::encode)
    }

    /// Parses a command from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] for invalid JSON or an unknown tag.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(payload).map_err(WireError::malformed)
    }
}
