//! # Database Migration Management
//!
//! Schema evolution using SQL migrations embedded in the binary. Each
//! migration runs in its own transaction and is recorded in
//! `_switchyard_migrations` together with a checksum of its content.

use crate::errors::{Result, SwitchyardError};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::{error, info, warn};

/// Embedded migrations as `(filename, sql)`, ordered by version
const MIGRATIONS: &[(&str, &str)] = &[(
    "20240601000001_initial_schema",
    include_str!("../../migrations/20240601000001_initial_schema.sql"),
)];

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: chrono::DateTime<chrono::Utc>,
    pub execution_time: i64,
    pub checksum: Vec<u8>,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Starting database migration process");

    create_migration_table(pool).await?;
    let applied = get_applied_migration_versions(pool).await?;

    let mut migrations_run = 0;
    for (filename, sql) in MIGRATIONS {
        let version = extract_version_from_filename(filename)?;

        if applied.contains(&version) {
            info!(version = version, "Migration already applied: {}", filename);
            continue;
        }

        info!(version = version, "Running migration: {}", filename);
        let start_time = std::time::Instant::now();

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| SwitchyardError::storage(e, "Failed to start migration transaction"))?;

        // raw_sql supports multi-statement migrations
        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
            error!(error = %e, migration = filename, "Migration failed");
            SwitchyardError::storage(e, format!("Migration failed: {}", filename))
        })?;

        let execution_time = start_time.elapsed().as_millis() as i64;
        let checksum = calculate_checksum(sql);

        sqlx::query(
            "INSERT INTO _switchyard_migrations \
             (version, description, checksum, execution_time, installed_on) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(version)
        .bind(*filename)
        .bind(&checksum)
        .bind(execution_time)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, migration = filename, "Failed to record migration");
            SwitchyardError::storage(e, format!("Failed to record migration: {}", filename))
        })?;

        tx.commit().await.map_err(|e| {
            SwitchyardError::storage(e, "Failed to commit migration transaction")
        })?;

        migrations_run += 1;
        info!(
            version = version,
            execution_time_ms = execution_time,
            "Migration completed: {}",
            filename
        );
    }

    if migrations_run > 0 {
        info!(count = migrations_run, "Database migrations completed");
    } else {
        info!("No pending migrations");
    }

    Ok(())
}

/// Create the migration tracking table
async fn create_migration_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _switchyard_migrations (
            version BIGINT PRIMARY KEY,
            description TEXT NOT NULL,
            checksum BYTEA NOT NULL,
            execution_time BIGINT NOT NULL,
            installed_on TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
    "#,
    )
    .execute(pool)
    .await
    .map_err(|e| SwitchyardError::storage(e, "Failed to create migration tracking table"))?;

    Ok(())
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err)
        if db_err.message().contains("relation \"_switchyard_migrations\" does not exist"))
}

/// Get list of applied migration versions
async fn get_applied_migration_versions(pool: &DbPool) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT version FROM _switchyard_migrations ORDER BY version")
        .fetch_all(pool)
        .await;

    match rows {
        Ok(rows) => Ok(rows.into_iter().map(|row| row.get::<i64, _>("version")).collect()),
        // Table doesn't exist yet - expected on first run
        Err(e) if is_missing_table(&e) => Ok(Vec::new()),
        Err(e) => Err(SwitchyardError::storage(e, "Failed to get applied migrations")),
    }
}

/// Extract version number from migration filename
fn extract_version_from_filename(filename: &str) -> Result<i64> {
    let version_str = filename
        .split('_')
        .next()
        .ok_or_else(|| {
            SwitchyardError::internal(format!("Invalid migration filename: {}", filename))
        })?;

    version_str
        .parse::<i64>()
        .map_err(|_| {
            SwitchyardError::internal(format!("Invalid version in filename: {}", filename))
        })
}

/// SHA-256 of the migration content
fn calculate_checksum(content: &str) -> Vec<u8> {
    Sha256::digest(content.as_bytes()).to_vec()
}

/// Validate that exactly the embedded migrations are applied
pub async fn validate_migrations(pool: &DbPool) -> Result<bool> {
    info!("Validating migration integrity");

    let applied_versions = get_applied_migration_versions(pool).await?;
    let expected_versions: Vec<i64> =
        MIGRATIONS
            .iter()
            .map(|(filename, _)| extract_version_from_filename(filename))
            .collect::<Result<Vec<_>>>()?;

    for expected in &expected_versions {
        if !applied_versions.contains(expected) {
            warn!(version = expected, "Missing migration");
            return Ok(false);
        }
    }

    for applied in &applied_versions {
        if !expected_versions.contains(applied) {
            warn!(version = applied, "Unexpected migration found");
            return Ok(false);
        }
    }

    info!("Migration validation successful");
    Ok(true)
}

/// Embedded migrations not yet applied, by filename
pub async fn pending_migrations(pool: &DbPool) -> Result<Vec<&'static str>> {
    let applied = get_applied_migration_versions(pool).await?;
    let mut pending = Vec::new();
    for (filename, _) in MIGRATIONS {
        if !applied.contains(&extract_version_from_filename(filename)?) {
            pending.push(*filename);
        }
    }
    Ok(pending)
}

/// Get the current migration version (highest applied)
pub async fn get_migration_version(pool: &DbPool) -> Result<i64> {
    let applied = get_applied_migration_versions(pool).await?;
    Ok(applied.into_iter().max().unwrap_or(0))
}

/// List all applied migrations
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    let rows = sqlx::query(
        "SELECT version, description, checksum, execution_time, installed_on \
         FROM _switchyard_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(rows) => Ok(rows
            .into_iter()
            .map(|row| MigrationInfo {
                version: row.get("version"),
                description: row.get("description"),
                installed_on: row.get("installed_on"),
                execution_time: row.get("execution_time"),
                checksum: row.get("checksum"),
            })
            .collect()),
        Err(e) if is_missing_table(&e) => Ok(Vec::new()),
        Err(e) => Err(SwitchyardError::storage(e, "Failed to list applied migrations")),
    }
}
