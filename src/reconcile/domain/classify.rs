//! What a stream reported by an agent means for the control plane.

use crate::fleet::domain::AgentId;
use crate::stream::domain::{Stream, StreamStatus};

/// Interpretation of one stream id found in an agent's heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStream {
    /// The stream is bound to the reporting agent.
    Expected,
    /// The control plane lost track of a stream that should be running;
    /// the reporting agent's relay is adopted.
    Reannounce,
    /// The relay should not be running on the reporting agent.
    Zombie,
}

/// Classifies a stream reported by `reporter`. `stream` is `None` when no
/// record exists.
///
/// Bound streams in every status but `Inactive` are expected (a stop may
/// still be in flight). Unbound streams that failed or wait for allocation
/// are adopted while their schedule is on. Everything else, including
/// streams bound to another agent, is a zombie.
#[must_use]
pub fn classify_reported(stream: Option<&Stream>, reporter: AgentId) -> ReportedStream {
    let Some(record) = stream else {
        return ReportedStream::Zombie;
    };
    match record.assigned_agent() {
        Some(agent) if agent == reporter && record.status() != StreamStatus::Inactive => {
            ReportedStream::Expected
        }
        Some(_) => ReportedStream::Zombie,
        None if adoptable(record) => ReportedStream::Reannounce,
        None => ReportedStream::Zombie,
    }
}

fn adoptable(stream: &Stream) -> bool {
    matches!(stream.status(), StreamStatus::Error | StreamStatus::Pending)
        && stream.schedule_enabled()
        && !stream.archived()
}
