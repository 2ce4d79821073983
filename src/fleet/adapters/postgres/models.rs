//! Diesel row models for agent persistence.

use super::schema::agents;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for agent records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = agents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AgentRow {
    /// Agent identifier.
    pub id: uuid::Uuid,
    /// Unique agent name.
    pub name: String,
    /// Network address.
    pub address: String,
    /// Declared capacity.
    pub max_streams: i32,
    /// Counted load.
    pub current_streams: i32,
    /// Lifecycle status.
    pub status: String,
    /// Liveness timestamp.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Status change timestamp.
    pub status_changed_at: DateTime<Utc>,
    /// Capability tags.
    pub capabilities: Value,
    /// Deployed software version.
    pub software_version: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for agent records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agents)]
pub struct NewAgentRow {
    /// Agent identifier.
    pub id: uuid::Uuid,
    /// Unique agent name.
    pub name: String,
    /// Network address.
    pub address: String,
    /// Declared capacity.
    pub max_streams: i32,
    /// Counted load.
    pub current_streams: i32,
    /// Lifecycle status.
    pub status: String,
    /// Liveness timestamp.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Status change timestamp.
    pub status_changed_at: DateTime<Utc>,
    /// Capability tags.
    pub capabilities: Value,
    /// Deployed software version.
    pub software_version: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change timestamp.
    pub updated_at: DateTime<Utc>,
}
