//! # Database Connection Pool
//!
//! PostgreSQL pool creation for [`PgStore`](super::PgStore) and the database
//! CLI commands. The in-memory store never opens a pool.

use crate::config::DatabaseConfig;
use crate::errors::{Result, SwitchyardError};
use sqlx::{Pool, Postgres};

/// Type alias for the database connection pool
pub type DbPool = Pool<Postgres>;

/// Create a database connection pool with the specified configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    validate_config(config)?;

    let pool_options = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .test_before_acquire(true);

    let pool_options = if let Some(idle_timeout) = config.idle_timeout() {
        pool_options.idle_timeout(idle_timeout)
    } else {
        pool_options
    };

    let pool = pool_options.connect(&config.url).await.map_err(|e| {
        tracing::error!(
            error = %e,
            url = %sanitize_url(&config.url),
            "Failed to create database pool"
        );
        SwitchyardError::storage(
            e,
            format!("Failed to connect to database: {}", sanitize_url(&config.url)),
        )
    })?;

    tracing::info!(
        database_type = "postgresql",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_ms = config.connect_timeout().as_millis(),
        idle_timeout_ms = config.idle_timeout().map(|d| d.as_millis()),
        "Database connection pool created"
    );

    if config.auto_migrate {
        tracing::info!("Auto-migration enabled, running database migrations");
        crate::storage::migrations::run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// Validate database configuration
fn validate_config(config: &DatabaseConfig) -> Result<()> {
    if config.max_connections == 0 {
        return Err(SwitchyardError::config("max_connections must be greater than 0"));
    }

    if config.min_connections > config.max_connections {
        return Err(SwitchyardError::config(
            "min_connections cannot be greater than max_connections",
        ));
    }

    if config.url.is_empty() {
        return Err(SwitchyardError::config("database URL cannot be empty"));
    }

    if !config.is_postgresql() {
        return Err(SwitchyardError::config(
            "database URL must start with 'postgresql://' or 'postgres://'",
        ));
    }

    Ok(())
}

/// Sanitize database URL for logging (remove credentials)
pub(crate) fn sanitize_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.password().is_some() || !parsed.username().is_empty() {
            format!(
                "{}://***:***@{}{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("unknown"),
                parsed.path()
            )
        } else {
            url.to_string()
        }
    } else {
        url.to_string()
    }
}
