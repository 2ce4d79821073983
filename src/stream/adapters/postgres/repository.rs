//! `PostgreSQL` stream repository.
//!
//! `update` filters on the loaded revision; zero affected rows means either
//! the stream is gone or another writer saved first.

use super::{models::StreamRow, schema::streams};
use crate::fleet::domain::AgentId;
use crate::persistence::{PgPool, run_blocking_with};
use crate::stream::{
    domain::{
        OwnerId, PersistedStreamData, RelayTarget, Stream, StreamId, StreamStatus, VideoFile,
    },
    ports::{StreamRepository, StreamRepositoryError, StreamRepositoryResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL`-backed stream repository.
#[derive(Debug, Clone)]
pub struct PostgresStreamRepository {
    pool: PgPool,
}

impl PostgresStreamRepository {
    /// Creates a repository from a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> StreamRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StreamRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking_with(&self.pool, f, StreamRepositoryError::persistence).await
    }
}

#[async_trait]
impl StreamRepository for PostgresStreamRepository {
    async fn create(&self, stream: &Stream) -> StreamRepositoryResult<()> {
        let stream_id = stream.id();
        let row = to_row(stream, stream.revision())?;
        self.run_blocking(move |connection| {
            diesel::insert_into(streams::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        StreamRepositoryError::DuplicateStream(stream_id)
                    }
                    _ => StreamRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, stream: &Stream) -> StreamRepositoryResult<Stream> {
        let stream_id = stream.id();
        let expected = stream.revision();
        let expected_db = to_db_revision(expected)?;
        let row = to_row(stream, expected + 1)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                streams::table
                    .filter(streams::id.eq(stream_id.into_inner()))
                    .filter(streams::revision.eq(expected_db)),
            )
            .set(&row)
            .execute(connection)
            .map_err(StreamRepositoryError::persistence)?;

            if updated == 0 {
                let exists = streams::table
                    .filter(streams::id.eq(stream_id.into_inner()))
                    .select(streams::id)
                    .first::<uuid::Uuid>(connection)
                    .optional()
                    .map_err(StreamRepositoryError::persistence)?;
                return Err(exists.map_or(StreamRepositoryError::NotFound(stream_id), |_| {
                    StreamRepositoryError::Conflict {
                        id: stream_id,
                        expected,
                    }
                }));
            }
            row_to_stream(row)
        })
        .await
    }

    async fn find_by_id(&self, id: StreamId) -> StreamRepositoryResult<Option<Stream>> {
        self.run_blocking(move |connection| {
            let row = streams::table
                .filter(streams::id.eq(id.into_inner()))
                .select(StreamRow::as_select())
                .first::<StreamRow>(connection)
                .optional()
                .map_err(StreamRepositoryError::persistence)?;
            row.map(row_to_stream).transpose()
        })
        .await
    }

    async fn list_by_status(&self, status: StreamStatus) -> StreamRepositoryResult<Vec<Stream>> {
        self.run_blocking(move |connection| {
            let rows = streams::table
                .filter(streams::status.eq(status.as_str()))
                .order((streams::status_changed_at.asc(), streams::id.asc()))
                .select(StreamRow::as_select())
                .load::<StreamRow>(connection)
                .map_err(StreamRepositoryError::persistence)?;
            rows.into_iter().map(row_to_stream).collect()
        })
        .await
    }

    async fn list_by_agent(&self, agent: AgentId) -> StreamRepositoryResult<Vec<Stream>> {
        self.run_blocking(move |connection| {
            let rows = streams::table
                .filter(streams::assigned_agent_id.eq(agent.into_inner()))
                .order((streams::status_changed_at.asc(), streams::id.asc()))
                .select(StreamRow::as_select())
                .load::<StreamRow>(connection)
                .map_err(StreamRepositoryError::persistence)?;
            rows.into_iter().map(row_to_stream).collect()
        })
        .await
    }

    async fn count_counted_on(&self, agent: AgentId) -> StreamRepositoryResult<u32> {
        let counted: Vec<&'static str> = StreamStatus::ALL
            .into_iter()
            .filter(|status| status.counts_against_agent())
            .map(StreamStatus::as_str)
            .collect();
        self.run_blocking(move |connection| {
            let total = streams::table
                .filter(streams::assigned_agent_id.eq(agent.into_inner()))
                .filter(streams::status.eq_any(counted))
                .count()
                .get_result::<i64>(connection)
                .map_err(StreamRepositoryError::persistence)?;
            u32::try_from(total).map_err(StreamRepositoryError::invalid_persisted_data)
        })
        .await
    }
}

fn to_db_revision(revision: u64) -> StreamRepositoryResult<i64> {
    i64::try_from(revision).map_err(StreamRepositoryError::persistence)
}

fn to_row(stream: &Stream, revision: u64) -> StreamRepositoryResult<StreamRow> {
    let to_json = |value: serde_json::Result<serde_json::Value>| {
        value.map_err(StreamRepositoryError::persistence)
    };
    Ok(StreamRow {
        id: stream.id().into_inner(),
        owner_id: stream.owner().into_inner(),
        title: stream.title().to_owned(),
        status: stream.status().as_str().to_owned(),
        assigned_agent_id: stream.assigned_agent().map(AgentId::into_inner),
        video_files: to_json(serde_json::to_value(stream.video_files()))?,
        primary_target: stream.primary_target().as_str().to_owned(),
        push_targets: to_json(serde_json::to_value(stream.push_targets()))?,
        loop_playback: stream.loop_playback(),
        schedule_enabled: stream.schedule_enabled(),
        archived: stream.archived(),
        last_started_at: stream.last_started_at(),
        last_stopped_at: stream.last_stopped_at(),
        last_status_at: stream.last_status_at(),
        status_changed_at: stream.status_changed_at(),
        error_message: stream.error_message().map(str::to_owned),
        progress: stream.progress().cloned(),
        recent_crashes: to_json(serde_json::to_value(stream.recent_crashes()))?,
        revision: to_db_revision(revision)?,
        created_at: stream.created_at(),
        updated_at: stream.updated_at(),
    })
}

fn row_to_stream(row: StreamRow) -> StreamRepositoryResult<Stream> {
    let StreamRow {
        id,
        owner_id,
        title,
        status,
        assigned_agent_id,
        video_files,
        primary_target,
        push_targets,
        loop_playback,
        schedule_enabled,
        archived,
        last_started_at,
        last_stopped_at,
        last_status_at,
        status_changed_at,
        error_message,
        progress,
        recent_crashes,
        revision,
        created_at,
        updated_at,
    } = row;

    let parsed_status = StreamStatus::try_from(status.as_str())
        .map_err(StreamRepositoryError::invalid_persisted_data)?;
    let parsed_files: Vec<VideoFile> = serde_json::from_value(video_files)
        .map_err(StreamRepositoryError::invalid_persisted_data)?;
    let parsed_primary =
        RelayTarget::parse(primary_target).map_err(StreamRepositoryError::invalid_persisted_data)?;
    let parsed_push: Vec<RelayTarget> = serde_json::from_value(push_targets)
        .map_err(StreamRepositoryError::invalid_persisted_data)?;
    let parsed_crashes: Vec<DateTime<Utc>> = serde_json::from_value(recent_crashes)
        .map_err(StreamRepositoryError::invalid_persisted_data)?;
    let parsed_revision =
        u64::try_from(revision).map_err(StreamRepositoryError::invalid_persisted_data)?;

    let data = PersistedStreamData {
        id: StreamId::from_uuid(id),
        owner: OwnerId::from_uuid(owner_id),
        title,
        status: parsed_status,
        assigned_agent: assigned_agent_id.map(AgentId::from_uuid),
        video_files: parsed_files,
        primary_target: parsed_primary,
        push_targets: parsed_push,
        loop_playback,
        schedule_enabled,
        archived,
        last_started_at,
        last_stopped_at,
        last_status_at,
        status_changed_at,
        error_message,
        progress,
        recent_crashes: parsed_crashes,
        revision: parsed_revision,
        created_at,
        updated_at,
    };
    Ok(Stream::from_persisted(data))
}
