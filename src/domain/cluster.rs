//! Cluster domain types
//!
//! A cluster is the schedulable unit referenced by route rules. It carries
//! backend policies, a non-empty set of bound sub-clusters and the LB matrix
//! splitting traffic between them.

use super::id::{ClusterId, ProductId};
use super::lb_matrix::LbMatrix;
use super::sub_cluster::SubCluster;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Reserved route target: fall through to the product's advanced rules
pub const ADVANCED_MODE_CLUSTER: &str = "ADVANCED_MODE";

/// Reserved route target, alias of [`ADVANCED_MODE_CLUSTER`]
pub const GO_TO_ADVANCED_RULES_CLUSTER: &str = "GO_TO_ADVANCED_RULES";

/// Whether `name` is one of the reserved route targets
pub fn is_reserved_cluster_name(name: &str) -> bool {
    name == ADVANCED_MODE_CLUSTER || name == GO_TO_ADVANCED_RULES_CLUSTER
}

/// Connection handling towards backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConnectionPolicy {
    #[validate(range(min = 0, max = 10000))]
    pub max_idle_conn_per_host: i32,
    pub cancel_on_client_close: bool,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self { max_idle_conn_per_host: 2, cancel_on_client_close: false }
    }
}

/// Retry budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetryPolicy {
    #[validate(range(
        min = 0,
        max = 10,
        message = "Retries inside a sub cluster must be between 0 and 10"
    ))]
    pub max_retry_in_subcluster: i32,
    #[validate(range(
        min = 0,
        max = 10,
        message = "Retries across sub clusters must be between 0 and 10"
    ))]
    pub max_retry_cross_subcluster: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retry_in_subcluster: 2, max_retry_cross_subcluster: 0 }
    }
}

/// Request/response buffering, sizes in KB and intervals in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BufferPolicy {
    #[validate(range(min = 1, message = "Request write buffer size must be positive"))]
    pub req_write_buffer_size: i32,
    #[validate(range(min = 0))]
    pub req_flush_interval: i32,
    /// `-1` disables response flushing
    #[validate(range(min = -1))]
    pub res_flush_interval: i32,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self { req_write_buffer_size: 512, req_flush_interval: 0, res_flush_interval: -1 }
    }
}

/// Timeouts in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TimeoutPolicy {
    #[validate(range(min = 1))]
    pub conn_backend: i32,
    #[validate(range(min = 1))]
    pub response_header: i32,
    #[validate(range(min = 1))]
    pub read_client: i32,
    #[validate(range(min = 1))]
    pub read_client_again: i32,
    #[validate(range(min = 1))]
    pub write_client: i32,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            conn_backend: 2000,
            response_header: 60000,
            read_client: 30000,
            read_client_again: 60000,
            write_client: 60000,
        }
    }
}

/// Basic backend policy of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClusterBasic {
    #[validate(nested)]
    pub connection: ConnectionPolicy,
    #[validate(nested)]
    pub retries: RetryPolicy,
    #[validate(nested)]
    pub buffers: BufferPolicy,
    #[validate(nested)]
    pub timeouts: TimeoutPolicy,
}

/// Granularity of session stickiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickyType {
    #[default]
    SubCluster,
    Instance,
}

/// Key used to hash requests onto backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashStrategy {
    ClientIdOnly,
    #[default]
    ClientIpOnly,
    ClientIdPreferred,
}

impl HashStrategy {
    /// Numeric code understood by the data plane
    pub fn code(&self) -> i32 {
        match self {
            HashStrategy::ClientIdOnly => 0,
            HashStrategy::ClientIpOnly => 1,
            HashStrategy::ClientIdPreferred => 2,
        }
    }

    /// Whether the strategy reads a client identifier from a request header
    pub fn uses_header(&self) -> bool {
        !matches!(self, HashStrategy::ClientIpOnly)
    }
}

/// Session stickiness policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StickySessions {
    pub sticky_type: StickyType,
    pub hash_strategy: HashStrategy,
    pub hash_header: Option<String>,
}

/// Protocol of the passive health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckSchema {
    #[default]
    Http,
    Https,
    Tcp,
}

impl HealthCheckSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCheckSchema::Http => "http",
            HealthCheckSchema::Https => "https",
            HealthCheckSchema::Tcp => "tcp",
        }
    }
}

/// Passive health check policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PassiveHealthCheck {
    pub schema: HealthCheckSchema,
    /// Check interval in milliseconds
    #[validate(range(min = 1))]
    pub interval: i32,
    /// Consecutive failures before an instance is marked down
    #[validate(range(min = 1))]
    pub failnum: i32,
    /// Expected status code, 0 accepts any 2xx
    #[validate(range(min = 0, max = 599))]
    pub statuscode: i32,
    pub host: String,
    pub uri: String,
}

impl Default for PassiveHealthCheck {
    fn default() -> Self {
        Self {
            schema: HealthCheckSchema::Http,
            interval: 1000,
            failnum: 10,
            statuscode: 0,
            host: String::new(),
            uri: "/health_check".to_string(),
        }
    }
}

/// Cluster row as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub name: String,
    pub product_id: ProductId,
    pub description: String,
    pub basic: ClusterBasic,
    pub sticky_sessions: StickySessions,
    pub passive_health_check: PassiveHealthCheck,
}

/// The cluster aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub product_id: ProductId,
    pub description: String,
    pub basic: ClusterBasic,
    pub sticky_sessions: StickySessions,
    pub passive_health_check: PassiveHealthCheck,
    pub sub_clusters: Vec<SubCluster>,
    pub scheduler: Option<LbMatrix>,
    pub ready: bool,
}

impl Cluster {
    /// Assemble the aggregate. Readiness is every bound sub-cluster being
    /// ready, unless readiness checks are switched off.
    pub fn assemble(
        record: ClusterRecord,
        sub_clusters: Vec<SubCluster>,
        scheduler: Option<LbMatrix>,
        ignore_readiness_check: bool,
    ) -> Self {
        let ready = ignore_readiness_check || sub_clusters.iter().all(SubCluster::ready);
        Self {
            id: record.id,
            name: record.name,
            product_id: record.product_id,
            description: record.description,
            basic: record.basic,
            sticky_sessions: record.sticky_sessions,
            passive_health_check: record.passive_health_check,
            sub_clusters,
            scheduler,
            ready,
        }
    }

    /// Names of the bound sub-clusters
    pub fn sub_cluster_names(&self) -> Vec<String> {
        self.sub_clusters.iter().map(|s| s.name.clone()).collect()
    }

    pub fn record(&self) -> ClusterRecord {
        ClusterRecord {
            id: self.id,
            name: self.name.clone(),
            product_id: self.product_id,
            description: self.description.clone(),
            basic: self.basic.clone(),
            sticky_sessions: self.sticky_sessions.clone(),
            passive_health_check: self.passive_health_check.clone(),
        }
    }
}
