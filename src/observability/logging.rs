//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.
//!
//! In JSON logging mode every event is emitted as one JSON object per line with
//! span fields (for example `topic` on export spans) flattened into it.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Result, SwitchyardError};
use tracing_subscriber::{fmt, EnvFilter};

/// Create a tracing span for a config export.
///
/// ```rust,ignore
/// let span = export_span!("gslb.bfe1");
/// let span = export_span!("route_rule", last_version = "20240101000000000");
/// ```
#[macro_export]
macro_rules! export_span {
    ($topic:expr) => {
        tracing::info_span!("config_export", topic = %$topic)
    };
    ($topic:expr, $($field:tt)*) => {
        tracing::info_span!("config_export", topic = %$topic, $($field)*)
    };
}

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Installing twice is
/// not an error; the first subscriber wins (integration tests rely on this).
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            SwitchyardError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?,
    };

    let installed = if config.json_logging {
        fmt().with_env_filter(filter).json().flatten_event(true).with_current_span(true).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed; keeping the existing one");
    }

    Ok(())
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        service_name = %config.observability.service_name,
        database_type = if config.database.is_memory() { "memory" } else { "postgresql" },
        ignore_readiness_check = config.control.ignore_readiness_check,
        default_product = ?config.control.default_product,
        "Switchyard control plane configuration"
    );
}
