//! Per-product route rules
//!
//! Basic rules match on host and path lists; advanced rules evaluate a
//! condition expression. The advanced list is always terminated by the
//! catch-all [`DEFAULT_CONDITION`].

use super::id::ClusterId;
use serde::{Deserialize, Serialize};

/// Catch-all condition that must terminate every advanced rule list
pub const DEFAULT_CONDITION: &str = "default_t()";

/// Host/path based rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicRule {
    #[serde(default)]
    pub host_names: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    pub cluster_name: String,
    /// Resolved at write time; `None` for reserved targets
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
    #[serde(default)]
    pub description: String,
}

/// Expression based rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedRule {
    pub name: String,
    pub expression: String,
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
    #[serde(default)]
    pub description: String,
}

impl AdvancedRule {
    pub fn is_catch_all(&self) -> bool {
        self.expression.trim() == DEFAULT_CONDITION
    }
}

/// The complete, ordered rule set of one product
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductRouteRule {
    #[serde(default)]
    pub basic_rules: Vec<BasicRule>,
    #[serde(default)]
    pub advanced_rules: Vec<AdvancedRule>,
}

impl ProductRouteRule {
    /// Whether any rule routes to `cluster_id`
    pub fn references_cluster(&self, cluster_id: ClusterId) -> bool {
        self.basic_rules.iter().any(|r| r.cluster_id == Some(cluster_id))
            || self.advanced_rules.iter().any(|r| r.cluster_id == Some(cluster_id))
    }

    /// Whether any rule matches on `hostname`, either through a basic rule's
    /// host list or an advanced expression containing `req_host_in("<hostname>")`
    pub fn references_host(&self, hostname: &str) -> bool {
        let needle = host_condition(hostname);
        self.basic_rules
            .iter()
            .any(|r| r.host_names.iter().any(|h| h.eq_ignore_ascii_case(hostname)))
            || self.advanced_rules.iter().any(|r| r.expression.contains(&needle))
    }
}

/// Condition primitive matching a single host
pub fn host_condition(hostname: &str) -> String {
    format!("req_host_in(\"{}\")", hostname)
}
