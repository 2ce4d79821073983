//! Failure handling: per-endpoint circuit breaking, crash-restart policy,
//! zombie cleanup and network partition recovery.
//!
//! - Circuit state, error classes and the restart policy in [`domain`]
//! - Circuit storage, endpoint probing and entitlement checks in [`ports`]
//! - In-memory circuit storage, the TCP probe and static entitlements in
//!   [`adapters`]
//! - The circuit breaker, zombie reaper and partition monitor in
//!   [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
