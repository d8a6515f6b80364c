//! Test database utilities for in-library tests.
//!
//! Provides PostgreSQL test database infrastructure using Testcontainers.
//! Each `TestDatabase` instance starts a fresh PostgreSQL container with
//! all migrations applied, providing full isolation between tests.
//!
//! This module is only available in test builds (`#[cfg(test)]`).

use crate::config::DatabaseConfig;
use crate::storage::{create_pool, DbPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

/// Tenant product seeded next to the built-in one
pub const TEST_PRODUCT_NAME: &str = "test-product";

/// Stop and remove stale testcontainer PostgreSQL containers from previous runs.
///
/// `ContainerAsync::Drop` is async but Rust's `Drop` is sync, so cleanup tasks
/// get cancelled when the tokio runtime shuts down. This function finds and
/// removes any orphaned containers.
///
/// Runs at most once per test binary via `std::sync::Once`.
fn cleanup_stale_testcontainers() {
    use std::process::Command;

    static CLEANUP_ONCE: std::sync::Once = std::sync::Once::new();
    CLEANUP_ONCE.call_once(|| {
        let output = Command::new("docker")
            .args([
                "ps",
                "-q",
                "--filter",
                "label=org.testcontainers.managed-by=testcontainers",
                "--filter",
                "ancestor=postgres",
            ])
            .output();

        let container_ids = match output {
            Ok(out) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).trim().to_string()
            }
            _ => return,
        };

        let ids: Vec<&str> = container_ids.lines().filter(|l| !l.is_empty()).collect();
        if ids.is_empty() {
            return;
        }

        eprintln!(
            "[test_helpers] Cleaning up {} stale testcontainer(s) from previous runs",
            ids.len()
        );

        let mut rm_args = vec!["rm", "-f"];
        rm_args.extend(&ids);
        let _ = Command::new("docker").args(&rm_args).output();
    });
}

/// A test database backed by a Testcontainers PostgreSQL instance.
///
/// The container is stopped and removed when this struct is dropped. Keep it
/// alive for the duration of the test.
pub struct TestDatabase {
    pub pool: DbPool,
    _container: ContainerAsync<Postgres>,
}

impl TestDatabase {
    /// Start a fresh PostgreSQL container, apply every migration and seed a
    /// tenant product. `prefix` only shows up in failure messages.
    pub async fn new(prefix: &str) -> Self {
        cleanup_stale_testcontainers();

        let container = Postgres::default()
            .start()
            .await
            .unwrap_or_else(|e| {
                panic!("Failed to start PostgreSQL container for {}: {}", prefix, e)
            });

        let host = container
            .get_host()
            .await
            .unwrap_or_else(|e| panic!("Failed to get container host for {}: {}", prefix, e));

        let port = container
            .get_host_port_ipv4(5432)
            .await
            .unwrap_or_else(|e| panic!("Failed to get container port for {}: {}", prefix, e));

        let config = DatabaseConfig {
            url: format!("postgresql://postgres:postgres@{}:{}/postgres", host, port),
            auto_migrate: true,
            max_connections: 5,
            min_connections: 1,
            ..Default::default()
        };

        let pool = create_pool(&config)
            .await
            .unwrap_or_else(|e| panic!("Failed to create test pool for {}: {}", prefix, e));

        sqlx::query(
            "INSERT INTO products (name, description) VALUES ($1, 'seeded by tests') \
             ON CONFLICT (name) DO NOTHING",
        )
            .bind(TEST_PRODUCT_NAME)
            .execute(&pool)
            .await
            .unwrap_or_else(|e| panic!("Failed to seed product for {}: {}", prefix, e));

        Self { pool, _container: container }
    }
}
