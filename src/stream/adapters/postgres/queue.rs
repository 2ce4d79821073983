//! `PostgreSQL` wait queue.

use super::{models::NewQueueEntryRow, schema::stream_queue};
use crate::persistence::{PgPool, run_blocking_with};
use crate::stream::{
    domain::StreamId,
    ports::{WaitQueue, WaitQueueError, WaitQueueResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

/// `PostgreSQL`-backed FIFO wait queue.
#[derive(Debug, Clone)]
pub struct PostgresWaitQueue {
    pool: PgPool,
}

impl PostgresWaitQueue {
    /// Creates a queue from a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> WaitQueueResult<T>
    where
        F: FnOnce(&mut PgConnection) -> WaitQueueResult<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking_with(&self.pool, f, WaitQueueError::persistence).await
    }
}

#[async_trait]
impl WaitQueue for PostgresWaitQueue {
    async fn push(&self, id: StreamId, at: DateTime<Utc>) -> WaitQueueResult<bool> {
        let row = NewQueueEntryRow {
            stream_id: id.into_inner(),
            enqueued_at: at,
        };
        self.run_blocking(move |connection| {
            let inserted = diesel::insert_into(stream_queue::table)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(connection)
                .map_err(WaitQueueError::persistence)?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn peek(&self) -> WaitQueueResult<Option<StreamId>> {
        self.run_blocking(move |connection| {
            let head = stream_queue::table
                .order(stream_queue::position.asc())
                .select(stream_queue::stream_id)
                .first::<uuid::Uuid>(connection)
                .optional()
                .map_err(WaitQueueError::persistence)?;
            Ok(head.map(StreamId::from_uuid))
        })
        .await
    }

    async fn remove(&self, id: StreamId) -> WaitQueueResult<bool> {
        self.run_blocking(move |connection| {
            let deleted = diesel::delete(
                stream_queue::table.filter(stream_queue::stream_id.eq(id.into_inner())),
            )
            .execute(connection)
            .map_err(WaitQueueError::persistence)?;
            Ok(deleted == 1)
        })
        .await
    }

    async fn list(&self) -> WaitQueueResult<Vec<StreamId>> {
        self.run_blocking(move |connection| {
            let ids = stream_queue::table
                .order(stream_queue::position.asc())
                .select(stream_queue::stream_id)
                .load::<uuid::Uuid>(connection)
                .map_err(WaitQueueError::persistence)?;
            Ok(ids.into_iter().map(StreamId::from_uuid).collect())
        })
        .await
    }
}
