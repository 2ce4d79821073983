//! Port contract for the publish/subscribe transport.

pub mod transport;

#[cfg(test)]
pub use transport::MockCommandBus;
pub use transport::{CommandBus, CommandBusError, CommandBusResult, Subscription};
