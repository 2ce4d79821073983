//! Step definitions for the fleet control scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
