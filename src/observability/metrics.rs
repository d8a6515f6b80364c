//! # Metrics
//!
//! Counters for the version-control ledger, recorded through the `metrics`
//! facade. The embedding process decides whether to install a recorder.

use metrics::{counter, describe_counter};
use std::sync::Once;

/// Metrics recorder for config exports
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        static DESCRIBE: Once = Once::new();
        DESCRIBE.call_once(|| {
            describe_counter!(
                "config_versions_minted_total",
                "Exports whose content changed and received a new version"
            );
            describe_counter!(
                "config_versions_reused_total",
                "Exports whose content was unchanged and reused the last version"
            );
        });
        Self
    }

    /// Record the outcome of one export
    pub fn record_export(&self, topic: &str, minted: bool) {
        let labels = [("topic", topic.to_string())];
        if minted {
            counter!("config_versions_minted_total", &labels).increment(1);
        } else {
            counter!("config_versions_reused_total", &labels).increment(1);
        }
    }
}
