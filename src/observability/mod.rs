//! # Observability Infrastructure
//!
//! Structured logging and export counters for the Switchyard control plane.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::MetricsRecorder;
