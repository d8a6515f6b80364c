//! # Configuration Management
//!
//! Layered configuration for the Switchyard control plane: built-in defaults,
//! an optional TOML file, then `SWITCHYARD__*` environment variables.

pub mod settings;

pub use settings::{
    AppConfig, ControlConfig, DatabaseConfig, ObservabilityConfig, ENV_PREFIX, MEMORY_DATABASE_URL,
};
