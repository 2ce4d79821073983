//! Relayfleet: control plane for a fleet of FFmpeg relay agents.
//!
//! Users create streams; the control plane places each one on an agent with
//! spare capacity, tells the agent to start relaying over a command bus and
//! keeps its own records in step with what agents report.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure state machines and value types
//! - **Ports**: Abstract trait interfaces for storage and collaborators
//! - **Adapters**: In-memory and `PostgreSQL` implementations of the ports
//! - **Services**: Orchestration over the ports
//!
//! # Modules
//!
//! - [`fleet`]: Agent registry and capacity accounting
//! - [`stream`]: Stream lifecycle, allocation and the FIFO wait queue
//! - [`bus`]: Command and event wire format and transport
//! - [`reconcile`]: Heartbeat and status event handling, transient sweeps
//! - [`resilience`]: Circuit breaker, zombie cleanup, partitions and
//!   crash-restart policy
//! - [`handover`]: Zero-downtime agent updates
//! - [`daemon`]: Supervision of the background workers

pub mod bus;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod fleet;
pub mod handover;
pub mod persistence;
pub mod reconcile;
pub mod resilience;
pub mod retry;
pub mod signal;
pub mod stream;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;
