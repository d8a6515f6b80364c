//! # Configuration Settings
//!
//! Defines the configuration structure for the Switchyard control plane.

use crate::errors::{Result, SwitchyardError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix, e.g. `SWITCHYARD__DATABASE__URL`
pub const ENV_PREFIX: &str = "SWITCHYARD";

/// URL selecting the in-memory store
pub const MEMORY_DATABASE_URL: &str = "memory://";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Control plane behavior
    #[validate(nested)]
    pub control: ControlConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Later sources override earlier ones; environment variables use the
    /// `SWITCHYARD__SECTION__KEY` form.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&AppConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let loaded: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(SwitchyardError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.database.min_connections > self.database.max_connections {
            return Err(SwitchyardError::config(
                "min_connections cannot be greater than max_connections",
            ));
        }

        if !self.database.is_memory() && !self.database.is_postgresql() {
            return Err(SwitchyardError::config(
                "Database URL must start with 'postgresql://', 'postgres://' or be 'memory://'",
            ));
        }

        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: MEMORY_DATABASE_URL.to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this selects the in-memory store
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_DATABASE_URL
    }

    /// Check if this is a PostgreSQL configuration
    pub fn is_postgresql(&self) -> bool {
        self.url.starts_with("postgresql://") || self.url.starts_with("postgres://")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "switchyard".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

/// Behavior switches for the managers and exporters
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct ControlConfig {
    /// Skip sub-cluster readiness checks when binding sub-clusters to clusters
    pub ignore_readiness_check: bool,

    /// Product that serves requests whose host matches no registered domain
    #[validate(length(min = 1, message = "Default product cannot be empty"))]
    pub default_product: Option<String>,
}
