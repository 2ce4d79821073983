//! Reconciliation of believed state against what agents report.
//!
//! Agents may drop status events, die silently or survive a control-plane
//! restart with relays still running. Reconciliation therefore works from
//! two directions: agent reports (status events and heartbeats) correct the
//! stream records as they arrive, and a periodic sweep corrects records
//! whose expected signal never came.
//!
//! - Report classification and the heartbeat cache in [`domain`]
//! - Event handlers and the transient sweeper in [`services`]

pub mod domain;
pub mod services;
