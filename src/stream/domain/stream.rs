//! Stream aggregate root.

use super::{OwnerId, RelayTarget, StreamDomainError, StreamId, StreamStatus, VideoFile};
use crate::clock::is_older_than;
use crate::fleet::domain::AgentId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A logical broadcast relayed by at most one agent at a time.
///
/// `assigned_agent` is set while the stream is `Starting`, `Streaming`,
/// `Stopping` or `Partitioned`; other statuses leave it empty. `revision`
/// increases on every stored change and guards against lost updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    id: StreamId,
    owner: OwnerId,
    title: String,
    status: StreamStatus,
    assigned_agent: Option<AgentId>,
    video_files: Vec<VideoFile>,
    primary_target: RelayTarget,
    push_targets: Vec<RelayTarget>,
    loop_playback: bool,
    schedule_enabled: bool,
    archived: bool,
    last_started_at: Option<DateTime<Utc>>,
    last_stopped_at: Option<DateTime<Utc>>,
    last_status_at: DateTime<Utc>,
    status_changed_at: DateTime<Utc>,
    error_message: Option<String>,
    progress: Option<Value>,
    recent_crashes: Vec<DateTime<Utc>>,
    revision: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for creating a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStreamParams {
    /// Owning user.
    pub owner: OwnerId,
    /// Display title.
    pub title: String,
    /// Ordered source files.
    pub video_files: Vec<VideoFile>,
    /// Main ingest endpoint.
    pub primary_target: RelayTarget,
    /// Additional ingest endpoints.
    pub push_targets: Vec<RelayTarget>,
    /// Restart playback when the last file ends.
    pub loop_playback: bool,
}

/// Parameter object for reconstructing a persisted stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedStreamData {
    /// Persisted stream identifier.
    pub id: StreamId,
    /// Persisted owner.
    pub owner: OwnerId,
    /// Persisted title.
    pub title: String,
    /// Persisted status.
    pub status: StreamStatus,
    /// Persisted assignment.
    pub assigned_agent: Option<AgentId>,
    /// Persisted source files.
    pub video_files: Vec<VideoFile>,
    /// Persisted main endpoint.
    pub primary_target: RelayTarget,
    /// Persisted extra endpoints.
    pub push_targets: Vec<RelayTarget>,
    /// Persisted loop flag.
    pub loop_playback: bool,
    /// Persisted schedule flag.
    pub schedule_enabled: bool,
    /// Persisted archive flag.
    pub archived: bool,
    /// Persisted last start.
    pub last_started_at: Option<DateTime<Utc>>,
    /// Persisted last stop.
    pub last_stopped_at: Option<DateTime<Utc>>,
    /// Persisted liveness timestamp.
    pub last_status_at: DateTime<Utc>,
    /// Persisted status change timestamp.
    pub status_changed_at: DateTime<Utc>,
    /// Persisted error message.
    pub error_message: Option<String>,
    /// Persisted progress payload.
    pub progress: Option<Value>,
    /// Persisted crash timestamps.
    pub recent_crashes: Vec<DateTime<Utc>>,
    /// Persisted revision.
    pub revision: u64,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Stream {
    /// Creates an `Inactive` stream with its schedule enabled.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::EmptyTitle`],
    /// [`StreamDomainError::NoVideoFiles`] or
    /// [`StreamDomainError::InvalidVideoFile`] when validation fails.
    pub fn new(params: NewStreamParams, clock: &impl Clock) -> Result<Self, StreamDomainError> {
        let NewStreamParams {
            owner,
            title,
            video_files,
            primary_target,
            push_targets,
            loop_playback,
        } = params;

        let trimmed_title = title.trim().to_owned();
        if trimmed_title.is_empty() {
            return Err(StreamDomainError::EmptyTitle);
        }
        validate_files(&video_files)?;

        let timestamp = clock.utc();
        Ok(Self {
            id: StreamId::new(),
            owner,
            title: trimmed_title,
            status: StreamStatus::Inactive,
            assigned_agent: None,
            video_files,
            primary_target,
            push_targets,
            loop_playback,
            schedule_enabled: true,
            archived: false,
            last_started_at: None,
            last_stopped_at: None,
            last_status_at: timestamp,
            status_changed_at: timestamp,
            error_message: None,
            progress: None,
            recent_crashes: Vec::new(),
            revision: 0,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a stream from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedStreamData) -> Self {
        Self {
            id: data.id,
            owner: data.owner,
            title: data.title,
            status: data.status,
            assigned_agent: data.assigned_agent,
            video_files: data.video_files,
            primary_target: data.primary_target,
            push_targets: data.push_targets,
            loop_playback: data.loop_playback,
            schedule_enabled: data.schedule_enabled,
            archived: data.archived,
            last_started_at: data.last_started_at,
            last_stopped_at: data.last_stopped_at,
            last_status_at: data.last_status_at,
            status_changed_at: data.status_changed_at,
            error_message: data.error_message,
            progress: data.progress,
            recent_crashes: data.recent_crashes,
            revision: data.revision,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the stream identifier.
    #[must_use]
    pub const fn id(&self) -> StreamId {
        self.id
    }

    /// Returns the owning user.
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> StreamStatus {
        self.status
    }

    /// Returns the agent the stream is bound to, if any.
    #[must_use]
    pub const fn assigned_agent(&self) -> Option<AgentId> {
        self.assigned_agent
    }

    /// Returns the agent whose load this stream counts against, if any.
    #[must_use]
    pub fn counted_agent(&self) -> Option<AgentId> {
        self.assigned_agent
            .filter(|_| self.status.counts_against_agent())
    }

    /// Returns the ordered source files.
    #[must_use]
    pub fn video_files(&self) -> &[VideoFile] {
        &self.video_files
    }

    /// Returns the main ingest endpoint.
    #[must_use]
    pub const fn primary_target(&self) -> &RelayTarget {
        &self.primary_target
    }

    /// Returns the extra ingest endpoints.
    #[must_use]
    pub fn push_targets(&self) -> &[RelayTarget] {
        &self.push_targets
    }

    /// Returns whether playback loops.
    #[must_use]
    pub const fn loop_playback(&self) -> bool {
        self.loop_playback
    }

    /// Returns whether automatic (re)starts are allowed.
    #[must_use]
    pub const fn schedule_enabled(&self) -> bool {
        self.schedule_enabled
    }

    /// Returns whether the stream is soft-archived.
    #[must_use]
    pub const fn archived(&self) -> bool {
        self.archived
    }

    /// Returns the last start timestamp.
    #[must_use]
    pub const fn last_started_at(&self) -> Option<DateTime<Utc>> {
        self.last_started_at
    }

    /// Returns the last stop timestamp.
    #[must_use]
    pub const fn last_stopped_at(&self) -> Option<DateTime<Utc>> {
        self.last_stopped_at
    }

    /// Returns when the agent last said anything about this stream.
    #[must_use]
    pub const fn last_status_at(&self) -> DateTime<Utc> {
        self.last_status_at
    }

    /// Returns when the status last changed.
    #[must_use]
    pub const fn status_changed_at(&self) -> DateTime<Utc> {
        self.status_changed_at
    }

    /// Returns the latest error message.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the latest progress payload reported by the agent.
    #[must_use]
    pub const fn progress(&self) -> Option<&Value> {
        self.progress.as_ref()
    }

    /// Returns the crash timestamps inside the current window.
    #[must_use]
    pub fn recent_crashes(&self) -> &[DateTime<Utc>] {
        &self.recent_crashes
    }

    /// Returns the optimistic concurrency revision.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest change timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether the stream is waiting for an agent.
    #[must_use]
    pub const fn is_awaiting_allocation(&self) -> bool {
        matches!(self.status, StreamStatus::Pending)
            && self.assigned_agent.is_none()
            && !self.archived
    }

    /// Binds the stream to `agent` and marks it `Starting`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidTransition`] from statuses that
    /// cannot start.
    pub fn begin_start(&mut self, agent: AgentId, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        self.move_to(StreamStatus::Starting, at)?;
        self.assigned_agent = Some(agent);
        self.last_started_at = Some(at);
        self.last_status_at = at;
        self.error_message = None;
        self.progress = None;
        Ok(())
    }

    /// Marks the relay as confirmed running.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidTransition`] when the stream is
    /// not starting or partitioned.
    pub fn mark_streaming(&mut self, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        if self.status != StreamStatus::Streaming {
            self.move_to(StreamStatus::Streaming, at)?;
        }
        self.last_status_at = at;
        Ok(())
    }

    /// Forces `Streaming` on `agent` after the agent reported the stream as
    /// running, clearing any stale error.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidTransition`] from `Stopping`.
    pub fn reannounce(&mut self, agent: AgentId, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        if self.status != StreamStatus::Streaming {
            self.move_to(StreamStatus::Streaming, at)?;
        }
        self.assigned_agent = Some(agent);
        self.error_message = None;
        self.last_status_at = at;
        Ok(())
    }

    /// Marks a stop as requested. The binding stays until the agent
    /// confirms.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidTransition`] unless the stream is
    /// starting or streaming.
    pub fn mark_stopping(&mut self, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        self.move_to(StreamStatus::Stopping, at)?;
        self.last_stopped_at = Some(at);
        Ok(())
    }

    /// Marks the stream stopped and unbinds it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidTransition`] from `Pending` only
    /// when the transition table forbids it.
    pub fn mark_inactive(&mut self, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        self.move_to(StreamStatus::Inactive, at)?;
        self.assigned_agent = None;
        self.last_stopped_at = Some(at);
        self.progress = None;
        Ok(())
    }

    /// Marks the stream failed with `message` and unbinds it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidTransition`] from `Inactive`.
    pub fn mark_error(
        &mut self,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StreamDomainError> {
        if self.status != StreamStatus::Error {
            self.move_to(StreamStatus::Error, at)?;
        }
        self.assigned_agent = None;
        self.error_message = Some(message.into());
        self.progress = None;
        self.updated_at = at;
        Ok(())
    }

    /// Unbinds the stream and marks it waiting for allocation.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidTransition`] from running
    /// statuses.
    pub fn mark_pending(&mut self, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        if self.status != StreamStatus::Pending {
            self.move_to(StreamStatus::Pending, at)?;
        }
        self.assigned_agent = None;
        self.updated_at = at;
        Ok(())
    }

    /// Marks the stream cut off with its partitioned agent. The binding is
    /// kept so the agent can reclaim the stream if it recovers.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidTransition`] from idle statuses.
    pub fn mark_partitioned(&mut self, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        self.move_to(StreamStatus::Partitioned, at)
    }

    /// Refreshes the liveness timestamp without changing status.
    pub fn touch_liveness(&mut self, at: DateTime<Utc>) {
        self.last_status_at = at;
        self.updated_at = at;
    }

    /// Stores the latest progress payload and refreshes liveness.
    pub fn record_progress(&mut self, progress: Value, at: DateTime<Utc>) {
        self.progress = Some(progress);
        self.touch_liveness(at);
    }

    /// Appends a crash and forgets crashes older than `window`.
    ///
    /// Returns the number of crashes left inside the window, including this
    /// one.
    pub fn record_crash(&mut self, at: DateTime<Utc>, window: Duration) -> usize {
        self.recent_crashes.push(at);
        self.recent_crashes
            .retain(|crash| !is_older_than(*crash, window, at));
        self.updated_at = at;
        self.recent_crashes.len()
    }

    /// Turns automatic (re)starts on or off.
    pub fn set_schedule_enabled(&mut self, enabled: bool, at: DateTime<Utc>) {
        self.schedule_enabled = enabled;
        self.updated_at = at;
    }

    /// Replaces the media and targets of a running stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::NoVideoFiles`] or
    /// [`StreamDomainError::InvalidVideoFile`] when validation fails.
    pub fn apply_update(
        &mut self,
        video_files: Vec<VideoFile>,
        push_targets: Vec<RelayTarget>,
        loop_playback: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StreamDomainError> {
        validate_files(&video_files)?;
        self.video_files = video_files;
        self.push_targets = push_targets;
        self.loop_playback = loop_playback;
        self.updated_at = at;
        Ok(())
    }

    /// Points the stream at a substitute ingest endpoint.
    pub fn replace_primary_target(&mut self, target: RelayTarget, at: DateTime<Utc>) {
        self.primary_target = target;
        self.updated_at = at;
    }

    /// Soft-archives a stream that is not running.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::ArchiveWhileRunning`] while the stream
    /// is bound to an agent.
    pub fn archive(&mut self, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        if self.assigned_agent.is_some() || self.status == StreamStatus::Pending {
            return Err(StreamDomainError::ArchiveWhileRunning(self.status));
        }
        self.archived = true;
        self.schedule_enabled = false;
        self.updated_at = at;
        Ok(())
    }

    /// Returns whether the stream has been `Starting` longer than `timeout`.
    #[must_use]
    pub fn start_timed_out(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        self.status == StreamStatus::Starting && is_older_than(self.status_changed_at, timeout, now)
    }

    /// Returns whether the stream has been `Stopping` longer than `timeout`.
    #[must_use]
    pub fn stop_timed_out(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        self.status == StreamStatus::Stopping && is_older_than(self.status_changed_at, timeout, now)
    }

    /// Returns whether a `Streaming` stream has been silent past `window`.
    #[must_use]
    pub fn is_silent(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.status == StreamStatus::Streaming && is_older_than(self.last_status_at, window, now)
    }

    /// Stamps the revision a store assigned on save.
    pub(crate) const fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    fn move_to(&mut self, target: StreamStatus, at: DateTime<Utc>) -> Result<(), StreamDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(StreamDomainError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.status_changed_at = at;
        self.updated_at = at;
        Ok(())
    }
}

fn validate_files(files: &[VideoFile]) -> Result<(), StreamDomainError> {
    if files.is_empty() {
        return Err(StreamDomainError::NoVideoFiles);
    }
    files.iter().try_for_each(VideoFile::validate)
}
