//! `PostgreSQL` agent registry.
//!
//! Load accounting relies on conditional `UPDATE` statements; the row count
//! tells whether the guard held.

use super::{
    models::{AgentRow, NewAgentRow},
    schema::agents,
};
use crate::fleet::{
    domain::{
        Agent, AgentCapabilities, AgentId, AgentName, AgentStatus, FleetDomainError,
        PersistedAgentData,
    },
    ports::{AgentRegistry, AgentRegistryError, AgentRegistryResult},
};
use crate::persistence::{PgPool, run_blocking_with};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL`-backed agent registry.
#[derive(Debug, Clone)]
pub struct PostgresAgentRegistry {
    pool: PgPool,
}

impl PostgresAgentRegistry {
    /// Creates a registry from a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> AgentRegistryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> AgentRegistryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking_with(&self.pool, f, AgentRegistryError::persistence).await
    }
}

#[async_trait]
impl AgentRegistry for PostgresAgentRegistry {
    async fn register(&self, agent: &Agent) -> AgentRegistryResult<()> {
        let agent_id = agent.id();
        let agent_name = agent.name().clone();
        let new_row = to_new_row(agent)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(agents::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                        if info.constraint_name() == Some("idx_agents_name") =>
                    {
                        AgentRegistryError::DuplicateAgentName(agent_name.clone())
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        AgentRegistryError::DuplicateAgent(agent_id)
                    }
                    _ => AgentRegistryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: AgentId) -> AgentRegistryResult<Option<Agent>> {
        self.run_blocking(move |connection| {
            let row = agents::table
                .filter(agents::id.eq(id.into_inner()))
                .select(AgentRow::as_select())
                .first::<AgentRow>(connection)
                .optional()
                .map_err(AgentRegistryError::persistence)?;
            row.map(row_to_agent).transpose()
        })
        .await
    }

    async fn list_all(&self) -> AgentRegistryResult<Vec<Agent>> {
        self.run_blocking(move |connection| {
            let rows = agents::table
                .order(agents::name.asc())
                .select(AgentRow::as_select())
                .load::<AgentRow>(connection)
                .map_err(AgentRegistryError::persistence)?;
            rows.into_iter().map(row_to_agent).collect()
        })
        .await
    }

    async fn list_by_status(&self, status: AgentStatus) -> AgentRegistryResult<Vec<Agent>> {
        self.run_blocking(move |connection| {
            let rows = agents::table
                .filter(agents::status.eq(status.as_str()))
                .order(agents::name.asc())
                .select(AgentRow::as_select())
                .load::<AgentRow>(connection)
                .map_err(AgentRegistryError::persistence)?;
            rows.into_iter().map(row_to_agent).collect()
        })
        .await
    }

    async fn try_reserve_slot(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<bool> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                agents::table
                    .filter(agents::id.eq(id.into_inner()))
                    .filter(agents::status.eq(AgentStatus::Active.as_str()))
                    .filter(agents::current_streams.lt(agents::max_streams)),
            )
            .set((
                agents::current_streams.eq(agents::current_streams + 1),
                agents::updated_at.eq(at),
            ))
            .execute(connection)
            .map_err(AgentRegistryError::persistence)?;

            if updated == 0 {
                ensure_exists(connection, id)?;
            }
            Ok(updated == 1)
        })
        .await
    }

    async fn release_slot(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<()> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                agents::table
                    .filter(agents::id.eq(id.into_inner()))
                    .filter(agents::current_streams.gt(0)),
            )
            .set((
                agents::current_streams.eq(agents::current_streams - 1),
                agents::updated_at.eq(at),
            ))
            .execute(connection)
            .map_err(AgentRegistryError::persistence)?;

            if updated == 0 {
                ensure_exists(connection, id)?;
            }
            Ok(())
        })
        .await
    }

    async fn reconcile_stream_count(
        &self,
        id: AgentId,
        expected: u32,
        observed: u32,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<bool> {
        let expected_val = to_db_count(expected)?;
        let observed_val = to_db_count(observed)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                agents::table
                    .filter(agents::id.eq(id.into_inner()))
                    .filter(agents::current_streams.eq(expected_val)),
            )
            .set((
                agents::current_streams.eq(observed_val),
                agents::updated_at.eq(at),
            ))
            .execute(connection)
            .map_err(AgentRegistryError::persistence)?;

            if updated == 0 {
                ensure_exists(connection, id)?;
            }
            Ok(updated == 1)
        })
        .await
    }

    async fn record_heartbeat(&self, id: AgentId, at: DateTime<Utc>) -> AgentRegistryResult<()> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(agents::table.filter(agents::id.eq(id.into_inner())))
                .set((
                    agents::last_heartbeat_at.eq(Some(at)),
                    agents::updated_at.eq(at),
                ))
                .execute(connection)
                .map_err(AgentRegistryError::persistence)?;
            require_updated(updated, id)
        })
        .await
    }

    async fn transition_status(
        &self,
        id: AgentId,
        allowed_from: &[AgentStatus],
        to: AgentStatus,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<bool> {
        let permitted: Vec<&'static str> = allowed_from
            .iter()
            .filter(|status| status.can_transition_to(to))
            .map(|status| status.as_str())
            .collect();

        self.run_blocking(move |connection| {
            if permitted.is_empty() {
                ensure_exists(connection, id)?;
                return Ok(false);
            }
            let updated = diesel::update(
                agents::table
                    .filter(agents::id.eq(id.into_inner()))
                    .filter(agents::status.eq_any(permitted)),
            )
            .set((
                agents::status.eq(to.as_str()),
                agents::status_changed_at.eq(at),
                agents::updated_at.eq(at),
            ))
            .execute(connection)
            .map_err(AgentRegistryError::persistence)?;

            if updated == 0 {
                ensure_exists(connection, id)?;
            }
            Ok(updated == 1)
        })
        .await
    }

    async fn set_capacity(
        &self,
        id: AgentId,
        max_streams: u32,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<()> {
        if max_streams == 0 {
            return Err(FleetDomainError::InvalidCapacity(max_streams).into());
        }
        let capacity = to_db_count(max_streams)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(agents::table.filter(agents::id.eq(id.into_inner())))
                .set((agents::max_streams.eq(capacity), agents::updated_at.eq(at)))
                .execute(connection)
                .map_err(AgentRegistryError::persistence)?;
            require_updated(updated, id)
        })
        .await
    }

    async fn set_software_version(
        &self,
        id: AgentId,
        version: &str,
        at: DateTime<Utc>,
    ) -> AgentRegistryResult<()> {
        let trimmed = version.trim().to_owned();
        if trimmed.is_empty() {
            return Err(FleetDomainError::EmptySoftwareVersion.into());
        }
        self.run_blocking(move |connection| {
            let updated = diesel::update(agents::table.filter(agents::id.eq(id.into_inner())))
                .set((
                    agents::software_version.eq(Some(trimmed)),
                    agents::updated_at.eq(at),
                ))
                .execute(connection)
                .map_err(AgentRegistryError::persistence)?;
            require_updated(updated, id)
        })
        .await
    }

    async fn deprovision(&self, id: AgentId) -> AgentRegistryResult<()> {
        self.run_blocking(move |connection| {
            let deleted = diesel::delete(
                agents::table
                    .filter(agents::id.eq(id.into_inner()))
                    .filter(agents::current_streams.eq(0)),
            )
            .execute(connection)
            .map_err(AgentRegistryError::persistence)?;

            if deleted == 0 {
                ensure_exists(connection, id)?;
                return Err(AgentRegistryError::Busy(id));
            }
            Ok(())
        })
        .await
    }
}

fn ensure_exists(connection: &mut PgConnection, id: AgentId) -> AgentRegistryResult<()> {
    let found = agents::table
        .filter(agents::id.eq(id.into_inner()))
        .select(agents::id)
        .first::<uuid::Uuid>(connection)
        .optional()
        .map_err(AgentRegistryError::persistence)?;
    found.map(|_| ()).ok_or(AgentRegistryError::NotFound(id))
}

const fn require_updated(updated: usize, id: AgentId) -> AgentRegistryResult<()> {
    if updated == 0 {
        return Err(AgentRegistryError::NotFound(id));
    }
    Ok(())
}

fn to_db_count(value: u32) -> AgentRegistryResult<i32> {
    i32::try_from(value).map_err(AgentRegistryError::persistence)
}

fn from_db_count(value: i32) -> AgentRegistryResult<u32> {
    u32::try_from(value).map_err(AgentRegistryError::invalid_persisted_data)
}

fn to_new_row(agent: &Agent) -> AgentRegistryResult<NewAgentRow> {
    let capabilities =
        serde_json::to_value(agent.capabilities()).map_err(AgentRegistryError::persistence)?;

    Ok(NewAgentRow {
        id: agent.id().into_inner(),
        name: agent.name().as_str().to_owned(),
        address: agent.address().to_owned(),
        max_streams: to_db_count(agent.max_streams())?,
        current_streams: to_db_count(agent.current_streams())?,
        status: agent.status().as_str().to_owned(),
        last_heartbeat_at: agent.last_heartbeat_at(),
        status_changed_at: agent.status_changed_at(),
        capabilities,
        software_version: agent.software_version().map(str::to_owned),
        created_at: agent.created_at(),
        updated_at: agent.updated_at(),
    })
}

fn row_to_agent(row: AgentRow) -> AgentRegistryResult<Agent> {
    let AgentRow {
        id,
        name,
        address,
        max_streams,
        current_streams,
        status,
        last_heartbeat_at,
        status_changed_at,
        capabilities,
        software_version,
        created_at,
        updated_at,
    } = row;

    let parsed_name = AgentName::new(&name).map_err(AgentRegistryError::invalid_persisted_data)?;
    let parsed_status =
        AgentStatus::try_from(status.as_str()).map_err(AgentRegistryError::invalid_persisted_data)?;
    let parsed_capabilities: AgentCapabilities = serde_json::from_value(capabilities)
        .map_err(AgentRegistryError::invalid_persisted_data)?;

    let data = PersistedAgentData {
        id: AgentId::from_uuid(id),
        name: parsed_name,
        address,
        max_streams: from_db_count(max_streams)?,
        current_streams: from_db_count(current_streams)?,
        status: parsed_status,
        last_heartbeat_at,
        status_changed_at,
        capabilities: parsed_capabilities,
        software_version,
        created_at,
        updated_at,
    };
    Ok(Agent::from_persisted(data))
}
