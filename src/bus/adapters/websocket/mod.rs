//! WebSocket transport for agents running on other hosts.
//!
//! The control plane keeps its in-process bus and exposes it through a
//! [`WebSocketGateway`]. Each agent connects with a [`WebSocketCommandBus`],
//! which implements the same port, so the agent-side services run unchanged
//! over the network.
//!
//! Frames are JSON text messages tagged by `op`. A client opens a topic
//! with `subscribe` and waits for `subscribed` (or `rejected`) before the
//! subscription is live; `publish` frames carry payloads both ways. A topic
//! opened by a remote client counts as one subscriber on the gateway's bus
//! until the connection closes, so dispatch to a disconnected agent reports
//! nobody listening.

mod client;
mod frame;
mod gateway;

pub use client::WebSocketCommandBus;
pub use frame::FrameError;
pub use gateway::WebSocketGateway;

/// Depth of the per-connection outbound frame queue.
const OUTBOUND_BUFFER: usize = 256;
