//! Shared `PostgreSQL` plumbing for the Diesel adapters.
//!
//! Diesel is synchronous, so every adapter offloads its queries to the
//! blocking pool through [`run_blocking_with`].

use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError, PooledConnection};

const CREATE_FLEET_TABLES_SQL: &str =
    include_str!("../migrations/2026-10-01-000000_create_fleet_tables/up.sql");

/// `PostgreSQL` connection pool type shared by all adapters.
pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Pooled connection type.
pub type PooledConn = PooledConnection<ConnectionManager<PgConnection>>;

/// Builds a connection pool for `database_url`.
///
/// # Errors
///
/// Returns [`PoolError`] when no initial connection can be established.
pub fn connect(database_url: &str) -> Result<PgPool, PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager)
}

/// Checks out a connection and runs `f` on the blocking thread pool.
///
/// Pool and join failures are wrapped in [`std::io::Error`] and converted
/// with `map_err` so each adapter reports them through its own port error.
pub async fn run_blocking_with<F, T, E, M>(pool: &PgPool, f: F, map_err: M) -> Result<T, E>
where
    F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    M: Fn(std::io::Error) -> E + Send + Clone + 'static,
{
    let pool_handle = pool.clone();
    let map_pool_err = map_err.clone();
    tokio::task::spawn_blocking(move || {
        let mut connection: PooledConn = pool_handle
            .get()
            .map_err(|err| map_pool_err(std::io::Error::other(err)))?;
        f(&mut connection)
    })
    .await
    .map_err(|err| map_err(std::io::Error::other(err)))?
}

/// Creates the agent, stream and queue tables when they are missing.
///
/// # Errors
///
/// Returns the checkout or SQL failure wrapped in [`std::io::Error`].
pub async fn apply_schema(pool: &PgPool) -> Result<(), std::io::Error> {
    run_blocking_with(
        pool,
        |connection| {
            connection
                .batch_execute(CREATE_FLEET_TABLES_SQL)
                .map_err(std::io::Error::other)
        },
        |err| err,
    )
    .await
}
