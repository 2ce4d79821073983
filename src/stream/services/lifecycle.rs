//! User intent to agent commands.
//!
//! Every status change goes through [`StreamLifecycleService::correct`],
//! which reloads the stream, applies the change and saves it under the
//! revision check. A lost revision race is retried against the fresh copy.
//! After a successful save the agent slot counts are settled: losing a
//! counted binding releases the slot and wakes the queue drainer.

use crate::bus::{
    domain::{AgentCommand, StreamTarget},
    ports::CommandBus,
    services::{CommandDispatcher, DispatchError},
};
use crate::fleet::{
    domain::AgentId,
    ports::{AgentRegistry, AgentRegistryError},
};
use crate::signal::DrainSignal;
use crate::stream::{
    domain::{
        NewStreamParams, OwnerId, RelayTarget, Stream, StreamDomainError, StreamId, StreamStatus,
        VideoFile,
    },
    ports::{StreamRepository, StreamRepositoryError, WaitQueue, WaitQueueError},
    services::{Allocation, AllocatorError, StreamAllocator},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attempts made when a save loses a revision race.
const REVISION_ATTEMPTS: u32 = 3;

/// Request payload for creating a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStreamRequest {
    owner: OwnerId,
    title: String,
    video_files: Vec<VideoFile>,
    primary_target: String,
    push_targets: Vec<String>,
    loop_playback: bool,
}

impl CreateStreamRequest {
    /// Creates a request relaying `video_files` to `primary_target`.
    #[must_use]
    pub fn new(
        owner: OwnerId,
        title: impl Into<String>,
        video_files: Vec<VideoFile>,
        primary_target: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            title: title.into(),
            video_files,
            primary_target: primary_target.into(),
            push_targets: Vec::new(),
            loop_playback: false,
        }
    }

    /// Adds extra ingest URLs.
    #[must_use]
    pub fn with_push_targets(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether playback restarts after the last file.
    #[must_use]
    pub const fn with_loop_playback(mut self, enabled: bool) -> Self {
        self.loop_playback = enabled;
        self
    }
}

/// Changes applied to a running stream. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChanges {
    video_files: Option<Vec<VideoFile>>,
    push_targets: Option<Vec<String>>,
    loop_playback: Option<bool>,
}

impl StreamChanges {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the source files.
    #[must_use]
    pub fn with_video_files(mut self, files: Vec<VideoFile>) -> Self {
        self.video_files = Some(files);
        self
    }

    /// Replaces the extra ingest URLs.
    #[must_use]
    pub fn with_push_targets(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push_targets = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    /// Changes the loop flag.
    #[must_use]
    pub const fn with_loop_playback(mut self, enabled: bool) -> Self {
        self.loop_playback = Some(enabled);
        self
    }
}

/// Service-level errors for stream lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Domain validation or transition failed.
    #[error(transparent)]
    Domain(#[from] StreamDomainError),
    /// Stream persistence failed.
    #[error(transparent)]
    Streams(#[from] StreamRepositoryError),
    /// Queue persistence failed.
    #[error(transparent)]
    Queue(#[from] WaitQueueError),
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] AgentRegistryError),
    /// Allocation failed.
    #[error(transparent)]
    Allocator(#[from] AllocatorError),
    /// The command could not be delivered.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The stream does not exist.
    #[error("stream {0} not found")]
    NotFound(StreamId),
    /// The operation is not valid in the stream's current status.
    #[error("cannot {operation} stream {id} while it is {status}")]
    InvalidState {
        /// Stream identifier.
        id: StreamId,
        /// Current status.
        status: StreamStatus,
        /// Rejected operation.
        operation: &'static str,
    },
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Drives streams through their lifecycle and keeps agent slot counts in
/// step with stream bindings.
#[derive(Clone)]
pub struct StreamLifecycleService<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    agents: Arc<A>,
    streams: Arc<S>,
    queue: Arc<Q>,
    allocator: StreamAllocator<A, S, Q, C>,
    dispatcher: CommandDispatcher<B>,
    clock: Arc<C>,
    drain: DrainSignal,
}

impl<A, S, Q, B, C> StreamLifecycleService<A, S, Q, B, C>
where
    A: AgentRegistry,
    S: StreamRepository,
    Q: WaitQueue,
    B: CommandBus,
    C: Clock + Send + Sync,
{
    /// Creates a new lifecycle service.
    #[must_use]
    pub fn new(
        agents: Arc<A>,
        streams: Arc<S>,
        queue: Arc<Q>,
        dispatcher: CommandDispatcher<B>,
        clock: Arc<C>,
        drain: DrainSignal,
    ) -> Self {
        let allocator = StreamAllocator::new(
            Arc::clone(&agents),
            Arc::clone(&streams),
            Arc::clone(&queue),
            Arc::clone(&clock),
        );
        Self {
            agents,
            streams,
            queue,
            allocator,
            dispatcher,
            clock,
            drain,
        }
    }

    /// Returns the allocator.
    #[must_use]
    pub const fn allocator(&self) -> &StreamAllocator<A, S, Q, C> {
        &self.allocator
    }

    /// Returns the command dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &CommandDispatcher<B> {
        &self.dispatcher
    }

    /// Returns the stream store.
    #[must_use]
    pub const fn streams(&self) -> &Arc<S> {
        &self.streams
    }

    /// Returns the drain signal.
    #[must_use]
    pub const fn drain_signal(&self) -> &DrainSignal {
        &self.drain
    }

    /// Validates and stores a new `Inactive` stream.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Domain`] when validation fails or
    /// [`LifecycleError::Streams`] when the store rejects the stream.
    pub async fn create(&self, request: CreateStreamRequest) -> LifecycleResult<Stream> {
        let CreateStreamRequest {
            owner,
            title,
            video_files,
            primary_target,
            push_targets,
            loop_playback,
        } = request;

        let stream = Stream::new(
            NewStreamParams {
                owner,
                title,
                video_files,
                primary_target: RelayTarget::parse(primary_target)?,
                push_targets: parse_targets(push_targets)?,
                loop_playback,
            },
            &*self.clock,
        )?;
        self.streams.create(&stream).await?;
        info!(stream_id = %stream.id(), owner = %stream.owner(), "stream created");
        Ok(stream)
    }

    /// Finds a stream by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when the stream is missing.
    pub async fn find(&self, id: StreamId) -> LifecycleResult<Stream> {
        self.streams
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    /// Starts a stream, or queues it behind earlier streams when the fleet
    /// is full. Starting a stream that is already starting or streaming
    /// changes nothing, and so does a start that loses a revision race to
    /// another start of the same stream.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] for stopping, partitioned or
    /// archived streams, and [`LifecycleError::Dispatch`] when START could
    /// not be delivered; the stream is then `Error` and its slot released.
    pub async fn start(&self, id: StreamId) -> LifecycleResult<Stream> {
        let mut attempt = 1;
        loop {
            let stream = self.find(id).await?;
            let queued_meanwhile = attempt > 1 && stream.status() == StreamStatus::Pending;
            if stream.status().is_running() || queued_meanwhile {
                debug!(stream_id = %id, status = %stream.status(), "start ignored; already started");
                return Ok(stream);
            }
            if !stream.status().can_start() || stream.archived() {
                return Err(LifecycleError::InvalidState {
                    id,
                    status: stream.status(),
                    operation: "start",
                });
            }
            match self.allocator.allocate_in_turn(stream).await {
                Ok(Allocation::Queued(queued)) => return Ok(queued),
                Ok(Allocation::Assigned { stream, agent }) => {
                    return self.dispatch_start(stream, agent).await;
                }
                Err(AllocatorError::Streams(StreamRepositoryError::Conflict { .. }))
                    if attempt < REVISION_ATTEMPTS =>
                {
                    debug!(stream_id = %id, attempt, "stream changed during start; reloading");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Requests a stop. Running streams move to `Stopping` and keep their
    /// slot until the agent confirms or the stopping timeout passes. A
    /// stream still waiting in the queue becomes `Inactive` at once.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] or a persistence error. A STOP
    /// that cannot be delivered is logged, not returned.
    pub async fn stop(&self, id: StreamId) -> LifecycleResult<Stream> {
        let stream = self.find(id).await?;
        match stream.status() {
            StreamStatus::Starting | StreamStatus::Streaming => {
                let stopping = self
                    .correct(id, |current, at| {
                        if current.status().is_running() {
                            current.mark_stopping(at)?;
                        }
                        Ok(())
                    })
                    .await?;
                if let Some(agent) = stopping.assigned_agent() {
                    self.send_or_log(agent, &AgentCommand::stop(id)).await;
                }
                info!(stream_id = %id, "stream stopping");
                Ok(stopping)
            }
            StreamStatus::Pending | StreamStatus::Partitioned => {
                let stopped = self
                    .correct(id, |current, at| Ok(current.mark_inactive(at)?))
                    .await?;
                self.queue.remove(id).await?;
                info!(stream_id = %id, "stream stopped before it started");
                Ok(stopped)
            }
            StreamStatus::Stopping | StreamStatus::Inactive | StreamStatus::Error => {
                debug!(stream_id = %id, status = %stream.status(), "stop ignored");
                Ok(stream)
            }
        }
    }

    /// Pushes new files or targets to a streaming relay without changing
    /// its status.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] unless the stream is
    /// `Streaming`, or [`LifecycleError::Dispatch`] when UPDATE could not
    /// be delivered.
    pub async fn update(&self, id: StreamId, changes: StreamChanges) -> LifecycleResult<Stream> {
        let StreamChanges {
            video_files,
            push_targets,
            loop_playback,
        } = changes;
        let targets = push_targets.map(parse_targets).transpose()?;

        let updated = self
            .correct(id, |current, at| {
                if current.status() != StreamStatus::Streaming {
                    return Err(LifecycleError::InvalidState {
                        id,
                        status: current.status(),
                        operation: "update",
                    });
                }
                let files = video_files
                    .clone()
                    .unwrap_or_else(|| current.video_files().to_vec());
                let pushes = targets
                    .clone()
                    .unwrap_or_else(|| current.push_targets().to_vec());
                let looped = loop_playback.unwrap_or(current.loop_playback());
                Ok(current.apply_update(files, pushes, looped, at)?)
            })
            .await?;
        if let Some(agent) = updated.assigned_agent() {
            self.dispatcher
                .send(agent, &AgentCommand::update(&updated))
                .await?;
        }
        info!(stream_id = %id, "stream updated");
        Ok(updated)
    }

    /// Asks `agent` to delete the downloaded files of a stream that is not
    /// running there.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] while the stream is bound to
    /// an agent, or [`LifecycleError::Dispatch`] when delivery fails.
    pub async fn cleanup_files(&self, id: StreamId, agent: AgentId) -> LifecycleResult<()> {
        let stream = self.find(id).await?;
        if stream.assigned_agent().is_some() || stream.status() == StreamStatus::Pending {
            return Err(LifecycleError::InvalidState {
                id,
                status: stream.status(),
                operation: "clean up files of",
            });
        }
        self.dispatcher
            .send(agent, &AgentCommand::CleanupFiles(StreamTarget { id }))
            .await?;
        info!(stream_id = %id, agent_id = %agent, "stream files cleanup requested");
        Ok(())
    }

    /// Turns automatic restarts on or off.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] or a persistence error.
    pub async fn set_schedule(&self, id: StreamId, enabled: bool) -> LifecycleResult<Stream> {
        self.correct(id, |current, at| {
            current.set_schedule_enabled(enabled, at);
            Ok(())
        })
        .await
    }

    /// Soft-archives a stream that is not running.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Domain`] while the stream is bound or
    /// queued.
    pub async fn archive(&self, id: StreamId) -> LifecycleResult<Stream> {
        let archived = self
            .correct(id, |current, at| Ok(current.archive(at)?))
            .await?;
        info!(stream_id = %id, "stream archived");
        Ok(archived)
    }

    /// Places queued streams in FIFO order and sends their START commands,
    /// stopping as soon as no agent has room.
    ///
    /// Returns the number of streams placed.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Allocator`] when the queue or a store
    /// fails. Delivery failures are logged and the stream left in `Error`.
    pub async fn drain_queue(&self) -> LifecycleResult<usize> {
        let mut placed = 0_usize;
        while let Some(allocation) = self.allocator.allocate_next_queued().await? {
            let Allocation::Assigned { stream, agent } = allocation else {
                break;
            };
            placed += 1;
            if let Err(err) = self.dispatch_start(stream, agent).await {
                warn!(agent_id = %agent, error = %err, "queued stream failed to start");
            }
        }
        if placed > 0 {
            info!(placed, "wait queue drained");
        }
        Ok(placed)
    }

    /// Unbinds a stream and puts it at the back of the wait queue.
    ///
    /// Running streams pass through `Error` first so the slot they held is
    /// released.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the stream cannot be made `Pending`
    /// or persistence fails.
    pub async fn requeue(&self, id: StreamId, reason: &str) -> LifecycleResult<Stream> {
        let pending = self
            .correct(id, |current, at| {
                if !current.status().can_transition_to(StreamStatus::Pending) {
                    current.mark_error(reason, at)?;
                }
                Ok(current.mark_pending(at)?)
            })
            .await?;
        self.queue.push(id, self.clock.utc()).await?;
        self.drain.raise();
        info!(stream_id = %id, reason, "stream requeued");
        Ok(pending)
    }

    /// Moves a running stream off `from` onto another agent with room,
    /// sending START to the new agent and then STOP to `from`.
    ///
    /// Returns the new agent, or `None` when the stream no longer runs on
    /// `from` or no other agent has a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Dispatch`] when START could not be
    /// delivered; the stream is then `Error`. Other variants signal
    /// persistence failures.
    pub async fn hand_over(&self, id: StreamId, from: AgentId) -> LifecycleResult<Option<AgentId>> {
        let stream = self.find(id).await?;
        if stream.assigned_agent() != Some(from) || !stream.status().is_running() {
            return Ok(None);
        }
        if self.allocator.spare_capacity(Some(from)).await? == 0 {
            debug!(stream_id = %id, agent_id = %from, "no room to hand stream over");
            return Ok(None);
        }
        let (moved, to) = match self.allocator.allocate_excluding(stream, Some(from)).await? {
            Allocation::Assigned { stream: moved, agent } => (moved, agent),
            Allocation::Queued(_) => return Ok(None),
        };
        self.agents.release_slot(from, self.clock.utc()).await?;
        self.dispatch_start(moved, to).await?;
        self.send_or_log(from, &AgentCommand::stop(id)).await;
        info!(stream_id = %id, from = %from, to = %to, "stream handed over");
        Ok(Some(to))
    }

    /// Reloads the stream, applies `change` and saves it, retrying when a
    /// concurrent writer bumped the revision. Agent slot counts are settled
    /// against the binding before and after the change.
    ///
    /// An unchanged stream is returned without saving.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`], the error produced by `change`,
    /// or [`LifecycleError::Streams`] once every attempt lost its race.
    pub async fn correct<F>(&self, id: StreamId, mut change: F) -> LifecycleResult<Stream>
    where
        F: FnMut(&mut Stream, chrono::DateTime<chrono::Utc>) -> LifecycleResult<()> + Send,
    {
        let mut attempt = 1;
        loop {
            let original = self.find(id).await?;
            let mut changed = original.clone();
            change(&mut changed, self.clock.utc())?;
            if changed == original {
                return Ok(original);
            }
            match self.streams.update(&changed).await {
                Ok(saved) => {
                    self.settle_slots(original.counted_agent(), saved.counted_agent())
                        .await?;
                    return Ok(saved);
                }
                Err(StreamRepositoryError::Conflict { .. }) if attempt < REVISION_ATTEMPTS => {
                    debug!(stream_id = %id, attempt, "stream changed concurrently; retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Sends `command` to `agent`, logging instead of failing.
    pub async fn send_or_log(&self, agent: AgentId, command: &AgentCommand) -> bool {
        match self.dispatcher.send(agent, command).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    agent_id = %agent,
                    stream_id = ?command.stream_id(),
                    command = command.tag(),
                    error = %err,
                    "command not delivered"
                );
                false
            }
        }
    }

    async fn dispatch_start(&self, stream: Stream, agent: AgentId) -> LifecycleResult<Stream> {
        let id = stream.id();
        match self.dispatcher.send(agent, &AgentCommand::start(&stream)).await {
            Ok(_) => {
                info!(stream_id = %id, agent_id = %agent, "stream starting");
                Ok(stream)
            }
            Err(err) => {
                warn!(stream_id = %id, agent_id = %agent, error = %err, "START not delivered; reverting allocation");
                let message = format!("start command not delivered: {err}");
                self.correct(id, |current, at| {
                    if current.assigned_agent() == Some(agent) {
                        current.mark_error(message.as_str(), at)?;
                    }
                    Ok(())
                })
                .await?;
                Err(err.into())
            }
        }
    }

    async fn settle_slots(
        &self,
        before: Option<AgentId>,
        after: Option<AgentId>,
    ) -> LifecycleResult<()> {
        if before == after {
            return Ok(());
        }
        let now = self.clock.utc();
        if let Some(released) = before {
            self.agents.release_slot(released, now).await?;
            self.drain.raise();
        }
        if let Some(claimed) = after {
            if !self.agents.try_reserve_slot(claimed, now).await? {
                warn!(agent_id = %claimed, "agent over capacity after rebinding; heartbeat will reconcile");
            }
        }
        Ok(())
    }
}

fn parse_targets(targets: Vec<String>) -> Result<Vec<RelayTarget>, StreamDomainError> {
    targets.into_iter().map(RelayTarget::parse).collect()
}
