//! Adapter implementations of the stream ports.

pub mod memory;
pub mod postgres;
