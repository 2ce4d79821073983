//! Stream placement onto agents.
//!
//! Candidates are ranked by load ratio, then by free slots, then by name.
//! The slot is claimed with the registry's compare-and-increment before the
//! stream is bound, so two allocations racing for an agent's last slot
//! cannot both win. Until the binding is saved the claim is also held in
//! [`InFlightReservations`], so a heartbeat counting bound streams in that
//! window cannot hand the slot out a second time. When no agent has room
//! the stream waits in the FIFO queue; exhaustion is never an error.

use crate::fleet::{
    domain::{Agent, AgentId, AgentStatus},
    ports::{AgentRegistry, AgentRegistryError},
};
use crate::stream::{
    domain::{Stream, StreamDomainError, StreamId},
    ports::{StreamRepository, StreamRepositoryError, WaitQueue, WaitQueueError},
};
use mockable::Clock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Outcome of an allocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// The stream is `Starting` on `agent`.
    Assigned {
        /// The stored stream.
        stream: Stream,
        /// The agent holding the slot.
        agent: AgentId,
    },
    /// No agent had room; the stream is `Pending` in the queue.
    Queued(Stream),
}

impl Allocation {
    /// Returns the stored stream.
    #[must_use]
    pub const fn stream(&self) -> &Stream {
        match self {
            Self::Assigned { stream, .. } | Self::Queued(stream) => stream,
        }
    }
}

/// Errors returned by the allocator.
#[derive(Debug, Error)]
pub enum AllocatorError {
    /// The stream cannot be moved to `Starting` or `Pending`.
    #[error(transparent)]
    Domain(#[from] StreamDomainError),
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] AgentRegistryError),
    /// Stream persistence failed or lost a revision race.
    #[error(transparent)]
    Streams(#[from] StreamRepositoryError),
    /// Queue persistence failed.
    #[error(transparent)]
    Queue(#[from] WaitQueueError),
}

/// Result type for allocator operations.
pub type AllocatorResult<T> = Result<T, AllocatorError>;

/// Slots claimed on agents whose stream binding is not saved yet.
#[derive(Debug, Default)]
pub struct InFlightReservations {
    held: Mutex<HashMap<AgentId, u32>>,
}

impl InFlightReservations {
    /// Returns the number of claimed but unbound slots on `agent`.
    #[must_use]
    pub fn on(&self, agent: AgentId) -> u32 {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&agent)
            .copied()
            .unwrap_or(0)
    }

    /// Records a claim on `agent` until the returned hold is dropped.
    ///
    /// The hold must be taken before the slot is reserved and dropped only
    /// after the binding is saved or the slot released.
    #[must_use]
    pub fn hold(self: &Arc<Self>, agent: AgentId) -> ReservationHold {
        *self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(agent)
            .or_insert(0) += 1;
        ReservationHold {
            ledger: Arc::clone(self),
            agent,
        }
    }

    fn release(&self, agent: AgentId) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = held.get_mut(&agent) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                held.remove(&agent);
            }
        }
    }
}

/// An outstanding claim recorded in [`InFlightReservations`].
#[derive(Debug)]
pub struct ReservationHold {
    ledger: Arc<InFlightReservations>,
    agent: AgentId,
}

impl Drop for ReservationHold {
    fn drop(&mut self) {
        self.ledger.release(self.agent);
    }
}

/// Places streams on agents under the load-count invariant.
#[derive(Clone)]
pub struct StreamAllocator<A, S, Q, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    C: Clock + Send + Sync,
{
    agents: Arc<A>,
    streams: Arc<S>,
    queue: Arc<Q>,
    clock: Arc<C>,
    in_flight: Arc<InFlightReservations>,
}

impl<A, S, Q, C> StreamAllocator<A, S, Q, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    C: Clock + Send + Sync,
{
    /// Creates a new allocator.
    #[must_use]
    pub fn new(agents: Arc<A>, streams: Arc<S>, queue: Arc<Q>, clock: Arc<C>) -> Self {
        Self {
            agents,
            streams,
            queue,
            clock,
            in_flight: Arc::default(),
        }
    }

    /// Returns the ledger of claimed but unbound slots.
    #[must_use]
    pub const fn in_flight(&self) -> &Arc<InFlightReservations> {
        &self.in_flight
    }

    /// Binds `stream` to the best-ranked agent with room, or queues it.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError`] when persistence fails, including a
    /// revision conflict on the stream; any claimed slot is released first.
    pub async fn allocate(&self, stream: Stream) -> AllocatorResult<Allocation> {
        self.allocate_excluding(stream, None).await
    }

    /// Allocates `stream` unless other streams are already waiting, in which
    /// case it joins the back of the queue.
    ///
    /// # Errors
    ///
    /// See [`Self::allocate`].
    pub async fn allocate_in_turn(&self, stream: Stream) -> AllocatorResult<Allocation> {
        match self.queue.peek().await? {
            Some(head) if head != stream.id() => self.enqueue(stream).await,
            _ => self.allocate(stream).await,
        }
    }

    /// Like [`Self::allocate`] but never picks `excluded`.
    ///
    /// # Errors
    ///
    /// See [`Self::allocate`].
    pub async fn allocate_excluding(
        &self,
        stream: Stream,
        excluded: Option<AgentId>,
    ) -> AllocatorResult<Allocation> {
        for agent in self.ranked_candidates(excluded).await? {
            let hold = self.in_flight.hold(agent.id());
            let now = self.clock.utc();
            if !self.agents.try_reserve_slot(agent.id(), now).await? {
                debug!(agent_id = %agent.id(), "agent filled up during allocation");
                continue;
            }
            let bound = self.bind(stream, agent.id()).await;
            drop(hold);
            return bound;
        }
        self.enqueue(stream).await
    }

    /// Places the oldest eligible queued stream, if any agent has room.
    ///
    /// Entries that no longer wait for allocation (stopped, archived or
    /// deleted meanwhile) are discarded. Returns `None` once the queue is
    /// empty or the fleet is full, leaving the queue head in place.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError`] when persistence fails.
    pub async fn allocate_next_queued(&self) -> AllocatorResult<Option<Allocation>> {
        while let Some(head) = self.queue.peek().await? {
            let Some(stream) = self.eligible_queued(head).await? else {
                self.queue.remove(head).await?;
                continue;
            };
            if !self.has_capacity().await? {
                return Ok(None);
            }
            return match self.allocate(stream).await? {
                placed @ Allocation::Assigned { .. } => Ok(Some(placed)),
                Allocation::Queued(_) => Ok(None),
            };
        }
        Ok(None)
    }

    /// Returns whether any `Active` agent has a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::Registry`] when lookup fails.
    pub async fn has_capacity(&self) -> AllocatorResult<bool> {
        Ok(self.spare_capacity(None).await? > 0)
    }

    /// Sums the free slots of `Active` agents other than `excluded`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::Registry`] when lookup fails.
    pub async fn spare_capacity(&self, excluded: Option<AgentId>) -> AllocatorResult<u32> {
        let agents = self.agents.list_by_status(AgentStatus::Active).await?;
        Ok(agents
            .iter()
            .filter(|agent| Some(agent.id()) != excluded)
            .map(Agent::free_slots)
            .fold(0_u32, u32::saturating_add))
    }

    async fn ranked_candidates(&self, excluded: Option<AgentId>) -> AllocatorResult<Vec<Agent>> {
        let mut candidates: Vec<Agent> = self
            .agents
            .list_by_status(AgentStatus::Active)
            .await?
            .into_iter()
            .filter(|agent| Some(agent.id()) != excluded && agent.free_slots() > 0)
            .collect();
        candidates.sort_by(rank);
        Ok(candidates)
    }

    async fn bind(&self, mut stream: Stream, agent: AgentId) -> AllocatorResult<Allocation> {
        let now = self.clock.utc();
        let saved = match stream.begin_start(agent, now) {
            Ok(()) => self.streams.update(&stream).await.map_err(AllocatorError::from),
            Err(err) => Err(err.into()),
        };
        match saved {
            Ok(stored) => {
                self.queue.remove(stored.id()).await?;
                info!(stream_id = %stored.id(), agent_id = %agent, "stream allocated");
                Ok(Allocation::Assigned {
                    stream: stored,
                    agent,
                })
            }
            Err(err) => {
                self.agents.release_slot(agent, self.clock.utc()).await?;
                warn!(stream_id = %stream.id(), agent_id = %agent, error = %err, "allocation rolled back");
                Err(err)
            }
        }
    }

    async fn enqueue(&self, mut stream: Stream) -> AllocatorResult<Allocation> {
        let now = self.clock.utc();
        let stored = if stream.is_awaiting_allocation() {
            stream
        } else {
            stream.mark_pending(now)?;
            self.streams.update(&stream).await?
        };
        if self.queue.push(stored.id(), now).await? {
            info!(stream_id = %stored.id(), "no capacity; stream queued");
        }
        Ok(Allocation::Queued(stored))
    }

    async fn eligible_queued(&self, id: StreamId) -> AllocatorResult<Option<Stream>> {
        let stream = self.streams.find_by_id(id).await?;
        Ok(stream.filter(Stream::is_awaiting_allocation))
    }
}

/// Orders agents best-first: lowest load ratio, most free slots, then name.
///
/// Ratios are compared by cross-multiplication to stay in integers.
fn rank(left: &Agent, right: &Agent) -> Ordering {
    let left_load = u64::from(left.current_streams()) * u64::from(right.max_streams());
    let right_load = u64::from(right.current_streams()) * u64::from(left.max_streams());
    left_load
        .cmp(&right_load)
        .then_with(|| right.free_slots().cmp(&left.free_slots()))
        .then_with(|| left.name().cmp(right.name()))
}
