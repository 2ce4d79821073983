//! Reconciliation domain types.

mod cache;
mod classify;

pub use cache::HeartbeatCache;
pub use classify::{ReportedStream, classify_reported};
