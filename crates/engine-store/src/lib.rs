//! Canonical PostgreSQL store for synced provider data (C3, §4.3).

pub mod gateway;
pub mod models;
pub mod pool;
pub mod schema;

pub use gateway::{PgStoreGateway, StoreGateway};
pub use pool::{get_connection, PgPool, PoolConfig, PoolError, PooledPg};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use crate::gateway::{PgStoreGateway, StoreGateway};
    pub use crate::pool::{PgPool, PoolConfig, PoolError};
    pub use engine_core::prelude::*;
}
