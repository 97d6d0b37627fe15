//! Connection pool for the canonical store (§5: "DB connections from pool,
//! worker holds connection only for per-event tx duration").

use std::time::Duration;

use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::PgConnection;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PooledPg = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to build connection pool: {0}")]
    Build(#[from] diesel::r2d2::PoolError),

    #[error("failed to check out a connection: {0}")]
    Checkout(String),
}

/// Builder mirroring the knobs a production deployment actually tunes:
/// pool size and per-checkout timeout. Defaults are conservative enough for
/// a single scheduler instance plus its worker pool.
pub struct PoolConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_idle: Option<u32>,
    pub connection_timeout: Duration,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            min_idle: Some(1),
            connection_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn build(self) -> Result<PgPool, PoolError> {
        let manager = ConnectionManager::<PgConnection>::new(self.database_url);
        let pool = Pool::builder()
            .max_size(self.max_connections)
            .min_idle(self.min_idle)
            .connection_timeout(self.connection_timeout)
            .build(manager)?;
        Ok(pool)
    }
}

/// Checks out a connection, wrapping the blocking r2d2 call so callers on
/// the tokio runtime don't block a worker thread waiting on the pool mutex
/// for longer than necessary.
pub async fn get_connection(pool: &PgPool) -> Result<PooledPg, PoolError> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || pool.get())
        .await
        .map_err(|e| PoolError::Checkout(e.to_string()))?
        .map_err(PoolError::Build)
}
