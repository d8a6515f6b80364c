//! # Storage and Persistence
//!
//! Store interfaces used by the managers plus two backends: an in-memory
//! store and a PostgreSQL store.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod traits;

#[cfg(all(test, feature = "postgres_tests"))]
pub(crate) mod test_helpers;

pub use crate::config::DatabaseConfig;

pub use memory::MemoryStore;
pub use migrations::{
    get_migration_version, list_applied_migrations, pending_migrations, validate_migrations,
    MigrationInfo,
};
pub use pool::{create_pool, DbPool};
pub use postgres::PgStore;
pub use traits::*;

use crate::errors::{Result, SwitchyardError};
use std::sync::Arc;

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Database connectivity check failed"))?;

    Ok(())
}

/// Open the store selected by the database URL: `memory://` for the
/// in-memory store, otherwise a PostgreSQL pool.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn Store>> {
    if config.is_memory() {
        tracing::info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = create_pool(config).await?;
    Ok(Arc::new(PgStore::new(pool)))
}
