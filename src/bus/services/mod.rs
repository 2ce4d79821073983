//! Services built on the transport: command dispatch, event fan-out and the
//! agent-side reporting helper.

mod dispatcher;
mod pump;
mod reporter;

pub use dispatcher::{CommandDispatcher, DispatchError, DispatchResult};
pub use pump::{EventPump, shard_for};
pub use reporter::{AgentInbox, AgentReporter, ReportError};
