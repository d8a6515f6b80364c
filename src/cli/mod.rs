//! # Command Line Interface
//!
//! Database management for the PostgreSQL store and one-shot exports of
//! data-plane configuration topics.

pub mod export;

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};

use crate::config::{AppConfig, DatabaseConfig};
use crate::observability::{init_logging, log_config_info};
use crate::storage::{
    check_connection, create_pool, get_migration_version, list_applied_migrations,
    pending_migrations, run_migrations, validate_migrations, MigrationInfo,
};

pub use export::ExportArgs;

#[derive(Debug, Parser)]
#[command(name = "switchyard")]
#[command(about = "Switchyard BFE load-balancer control plane tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database management commands
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },

    /// Export one configuration topic
    Export(ExportArgs),
}

#[derive(Debug, Subcommand)]
pub enum DatabaseCommands {
    /// Run pending migrations
    Migrate {
        /// Dry run - show what would be migrated
        #[arg(long)]
        dry_run: bool,
    },

    /// Show migration status
    Status,

    /// List all applied migrations
    List,

    /// Validate database schema
    Validate,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    run_with(Cli::parse()).await
}

/// Run an already parsed command line
pub async fn run_with(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;

    init_logging(&config.observability)?;
    log_config_info(&config);

    match cli.command {
        Commands::Database { command } => handle_database_command(command, &config.database).await,
        Commands::Export(args) => export::handle_export_command(args, &config).await,
    }
}

/// Load configuration and apply command-line overrides
fn resolve_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Handle database management commands
async fn handle_database_command(
    command: DatabaseCommands,
    config: &DatabaseConfig,
) -> anyhow::Result<()> {
    if config.is_memory() {
        bail!("Database commands need a PostgreSQL URL; the in-memory store has no schema");
    }

    let pool = create_pool(config).await?;

    match command {
        DatabaseCommands::Migrate { dry_run } => {
            if dry_run {
                let pending = pending_migrations(&pool).await?;
                if pending.is_empty() {
                    println!("No pending migrations");
                } else {
                    println!("Dry run mode - pending migrations:");
                    for filename in pending {
                        println!("  {}", filename);
                    }
                }
            } else {
                println!("Running database migrations...");
                run_migrations(&pool).await?;
                println!("Migrations completed successfully!");
            }
        }

        DatabaseCommands::Status => {
            check_connection(&pool).await?;
            println!("Schema version: {}", get_migration_version(&pool).await?);
            if validate_migrations(&pool).await? {
                println!("✅ Database schema is up to date");
            } else {
                bail!("Database schema has pending migrations");
            }
        }

        DatabaseCommands::List => {
            let migrations = list_applied_migrations(&pool).await?;
            if migrations.is_empty() {
                println!("No migrations have been applied");
            } else {
                println!("Applied migrations:");
                print_migrations_table(&migrations);
            }
        }

        DatabaseCommands::Validate => {
            println!("Validating database schema...");
            if validate_migrations(&pool).await? {
                println!("✅ Database schema validation passed");
            } else {
                bail!("Database schema validation failed");
            }
        }
    }

    Ok(())
}

/// Print migrations in a formatted table
fn print_migrations_table(migrations: &[MigrationInfo]) {
    println!();
    println!("{:<15} {:<50} {:<25} {:<10}", "Version", "Description", "Applied On", "Time (ms)");
    println!("{}", "-".repeat(100));

    for migration in migrations {
        println!(
            "{:<15} {:<50} {:<25} {:<10}",
            migration.version,
            truncate_string(&migration.description, 48),
            migration.installed_on.format("%Y-%m-%d %H:%M:%S"),
            migration.execution_time
        );
    }
}

/// Truncate a string to at most `max_len` characters
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
