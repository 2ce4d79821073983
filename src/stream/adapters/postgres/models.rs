//! Diesel row models for stream persistence.

use super::schema::{stream_queue, streams};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Stream row used for reads, inserts and optimistic updates.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = streams)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct StreamRow {
    /// Stream identifier.
    pub id: uuid::Uuid,
    /// Owning user.
    pub owner_id: uuid::Uuid,
    /// Display title.
    pub title: String,
    /// Lifecycle status.
    pub status: String,
    /// Bound agent.
    pub assigned_agent_id: Option<uuid::Uuid>,
    /// Ordered source files.
    pub video_files: Value,
    /// Main ingest URL.
    pub primary_target: String,
    /// Extra ingest URLs.
    pub push_targets: Value,
    /// Loop flag.
    pub loop_playback: bool,
    /// Automatic restart flag.
    pub schedule_enabled: bool,
    /// Soft-archive flag.
    pub archived: bool,
    /// Last start.
    pub last_started_at: Option<DateTime<Utc>>,
    /// Last stop.
    pub last_stopped_at: Option<DateTime<Utc>>,
    /// Liveness timestamp.
    pub last_status_at: DateTime<Utc>,
    /// Status change timestamp.
    pub status_changed_at: DateTime<Utc>,
    /// Latest error message.
    pub error_message: Option<String>,
    /// Latest progress payload.
    pub progress: Option<Value>,
    /// Crash timestamps.
    pub recent_crashes: Value,
    /// Optimistic concurrency revision.
    pub revision: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for queue entries; `position` comes from a sequence.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stream_queue)]
pub struct NewQueueEntryRow {
    /// Queued stream.
    pub stream_id: uuid::Uuid,
    /// Arrival timestamp.
    pub enqueued_at: DateTime<Utc>,
}
