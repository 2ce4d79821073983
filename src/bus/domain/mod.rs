//! Wire schema for agent commands and agent-originated events.
//!
//! All messages are JSON. Tags come from closed sets; an unknown tag fails
//! decoding instead of being ignored.

mod command;
mod error;
mod event;
mod topic;

pub use command::{AgentCommand, StreamConfig, StreamTarget, ZombieSweep};
pub use error::WireError;
pub use event::{AgentEvent, ExtraData, Heartbeat, ReportedStatus, StatusEvent};
pub use topic::Topic;
