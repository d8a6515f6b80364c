//! Domain layer
//!
//! This module contains the entities of the load balancer control plane and
//! the pure rules over them, with no storage dependencies. Anything that can
//! be decided from values alone (LB matrix checks, wildcard overlap, pool name
//! qualification, version minting) lives here.
//!
//! ## Module Organization
//!
//! - `id`: Type-safe identifiers with NewType pattern
//! - `product`: Tenant boundary and the built-in product
//! - `pool`, `sub_cluster`, `cluster`: The backend entity graph
//! - `bfe_cluster`: Load balancer fleet deployment units
//! - `lb_matrix`: Traffic split between BFE clusters and sub-clusters
//! - `hostname`: Product hostnames and wildcard matching
//! - `route_rule`: Basic and advanced route rules
//! - `certificate`: TLS server certificates
//! - `version`: Content-addressed configuration versions

pub mod bfe_cluster;
pub mod certificate;
pub mod cluster;
pub mod hostname;
pub mod id;
pub mod lb_matrix;
pub mod pool;
pub mod product;
pub mod route_rule;
pub mod sub_cluster;
pub mod version;

// Re-export main types from each module
pub use bfe_cluster::BfeCluster;
pub use certificate::Certificate;
pub use cluster::{
    is_reserved_cluster_name, BufferPolicy, Cluster, ClusterBasic, ClusterRecord,
    ConnectionPolicy, HashStrategy, HealthCheckSchema, PassiveHealthCheck, RetryPolicy,
    StickySessions, StickyType, TimeoutPolicy, ADVANCED_MODE_CLUSTER,
    GO_TO_ADVANCED_RULES_CLUSTER,
};
pub use hostname::Domain;
pub use id::{BfeClusterId, CertificateId, ClusterId, DomainId, PoolId, ProductId, SubClusterId};
pub use lb_matrix::{LbMatrix, LbRow, BLACKHOLE};
pub use pool::{Instance, Pool, PoolTag, PoolType};
pub use product::{Product, BUILTIN_PRODUCT_ID, BUILTIN_PRODUCT_NAME};
pub use route_rule::{host_condition, AdvancedRule, BasicRule, ProductRouteRule, DEFAULT_CONDITION};
pub use sub_cluster::{SubCluster, SubClusterRecord};
pub use version::{ConfigVersion, Versioned, ZERO_VERSION};
