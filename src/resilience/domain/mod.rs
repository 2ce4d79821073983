//! Pure failure-handling types.

mod circuit;
mod error_class;
mod restart;

pub use circuit::{CircuitState, CircuitStatus, Endpoint};
pub use error_class::{ErrorClass, PermanentKind};
pub use restart::{DisableReason, RestartDecision, RestartPolicy};
