//! Transport implementations.

mod memory;
pub mod websocket;

pub use memory::InMemoryCommandBus;
pub use websocket::{WebSocketCommandBus, WebSocketGateway};
