//! Agent-originated status events and heartbeats.

use super::WireError;
use crate::fleet::domain::AgentId;
use crate::stream::domain::StreamId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stream status as reported by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedStatus {
    /// Files downloading or relay spawning.
    Starting,
    /// Relay running.
    Streaming,
    /// Relay exited after a stop request.
    Stopped,
    /// Relay crashed.
    Error,
    /// The agent gave up restarting the relay on its own.
    Dead,
    /// Periodic progress sample.
    Progress,
}

impl ReportedStatus {
    /// Returns whether the report means the relay is no longer running
    /// because of a failure.
    #[must_use]
    pub const fn is_crash(self) -> bool {
        matches!(self, Self::Error | Self::Dead)
    }
}

/// Optional payload attached to a status event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraData {
    /// Encoder statistics attached to `PROGRESS` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_data: Option<Value>,
}

/// A status report about one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Stream the report is about.
    pub stream_id: StreamId,
    /// Reporting agent.
    pub vps_id: AgentId,
    /// Reported status.
    pub status: ReportedStatus,
    /// Human-readable detail; the error text for crashes.
    #[serde(default)]
    pub message: String,
    /// Optional payload.
    #[serde(default)]
    pub extra_data: ExtraData,
}

impl StatusEvent {
    /// Creates an event with an empty message.
    #[must_use]
    pub fn new(stream_id: StreamId, vps_id: AgentId, status: ReportedStatus) -> Self {
        Self {
            stream_id,
            vps_id,
            status,
            message: String::new(),
            extra_data: ExtraData::default(),
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the progress payload.
    #[must_use]
    pub fn with_progress(mut self, progress: Value) -> Self {
        self.extra_data.progress_data = Some(progress);
        self
    }
}

/// The periodic liveness report of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Reporting agent.
    pub vps_id: AgentId,
    /// Every stream the agent is currently relaying.
    #[serde(default)]
    pub active_streams: Vec<StreamId>,
}

/// Any event an agent publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// A stream status report.
    Status(StatusEvent),
    /// A heartbeat.
    Heartbeat(Heartbeat),
}

impl AgentEvent {
    /// Key used to route the event to a reconciliation shard: the stream for
    /// status events, the agent for heartbeats.
    #[must_use]
    pub const fn routing_key(&self) -> Uuid {
        match self {
            Self::Status(event) => event.stream_id.into_inner(),
            Self::Heartbeat(heartbeat) => heartbeat.vps_id.into_inner(),
        }
    }

    /// Serializes the inner message to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Encode`] when serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        match self {
            Self::Status(event) => serde_json::to_vec(event),
            Self::Heartbeat(heartbeat) => serde_json::to_vec(heartbeat),
        }
        .map_err(WireError::encode)
    }

    /// Parses a status event.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] for invalid JSON or an unknown status.
    pub fn decode_status(payload: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(payload)
            .map(Self::Status)
            .map_err(WireError::malformed)
    }

    /// Parses a heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] for invalid JSON.
    pub fn decode_heartbeat(payload: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(payload)
            .map(Self::Heartbeat)
            .map_err(WireError::malformed)
    }
}
