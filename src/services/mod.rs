//! Business logic services
//!
//! One service per entity kind. Services validate requests, then run every
//! read-then-write inside a single store unit of work.

pub mod bfe_cluster_service;
pub mod certificate_service;
pub mod cluster_service;
pub mod domain_service;
pub(crate) mod lookup;
pub mod pool_service;
pub mod product_service;
pub mod route_rule_service;
pub mod sub_cluster_service;
pub mod validation;
pub mod version_control;

pub use bfe_cluster_service::{BfeClusterService, CreateBfeClusterRequest};
pub use certificate_service::{CertificateService, CreateCertificateRequest};
pub use cluster_service::{
    ClusterDeleteChecker, ClusterService, CreateClusterRequest, UpdateClusterRequest,
};
pub use domain_service::{CreateDomainRequest, DomainService};
pub use pool_service::{CreatePoolRequest, PoolService};
pub use product_service::{CreateProductRequest, ProductService, UpdateProductRequest};
pub use route_rule_service::{RouteRuleClusterChecker, RouteRuleService};
pub use sub_cluster_service::{CreateSubClusterRequest, SubClusterService, UpdateSubClusterRequest};
pub use version_control::{Exporter, VersionControlService};
