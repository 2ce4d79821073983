//! Frames exchanged between the gateway and its clients.

use crate::bus::domain::Topic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

/// Errors raised while building or reading a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The payload is not UTF-8 text.
    #[error("payload is not UTF-8 text")]
    NotText,
    /// The topic name is not one the bus carries.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    /// The frame is not valid JSON of a known shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One WebSocket text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(super) enum Frame {
    /// Client asks to receive a topic.
    Subscribe { topic: String },
    /// Gateway confirms the subscription is live.
    Subscribed { topic: String },
    /// Gateway refused the subscription.
    Rejected { topic: String, reason: String },
    /// A payload on a topic, in either direction.
    Publish { topic: String, payload: String },
}

impl Frame {
    pub(super) fn subscribe(topic: &Topic) -> Self {
        Self::Subscribe {
            topic: topic.as_str().to_owned(),
        }
    }

    pub(super) fn publish(topic: &Topic, payload: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(payload).map_err(|_| FrameError::NotText)?;
        Ok(Self::Publish {
            topic: topic.as_str().to_owned(),
            payload: text.to_owned(),
        })
    }

    pub(super) fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    pub(super) fn to_message(&self) -> Result<Message, FrameError> {
        Ok(Message::text(serde_json::to_string(self)?))
    }
}

/// Parses a topic named in a frame.
pub(super) fn parse_topic(name: &str) -> Result<Topic, FrameError> {
    Topic::parse(name).ok_or_else(|| FrameError::UnknownTopic(name.to_owned()))
}
