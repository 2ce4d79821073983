//! Update orchestration.

mod coordinator;

pub use coordinator::{AgentUpdateCoordinator, UpdateError, UpdateResult, UpgradeReport};
