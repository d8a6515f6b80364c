//! Store interfaces
//!
//! The control plane only talks to storage through these traits. A [`Store`]
//! hands out [`StoreTx`] units of work; every read-then-write operation of a
//! manager runs inside one of them. Committing consumes the transaction and
//! dropping it without a commit rolls it back.
//!
//! Fetches take a filter value object. A filter field left as `None` does not
//! constrain the result. Absence is reported as an empty `Vec` or `None`,
//! never as an error.

use crate::domain::{
    BfeCluster, BfeClusterId, Certificate, CertificateId, ClusterBasic, ClusterId, ClusterRecord,
    ConfigVersion, Domain, DomainId, Instance, LbMatrix, PassiveHealthCheck, Pool, PoolId,
    PoolTag, PoolType, Product, ProductId, ProductRouteRule, StickySessions, SubClusterId,
    SubClusterRecord,
};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Entry point of a storage backend
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a unit of work
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// A unit of work spanning every entity store
#[async_trait]
pub trait StoreTx:
    Send
    + ProductStore
    + PoolStore
    + BfeClusterStore
    + SubClusterStore
    + ClusterStore
    + LbMatrixStore
    + DomainStore
    + RouteRuleStore
    + CertificateStore
    + ConfigVersionStore
{
    /// Make every write of this unit of work visible
    async fn commit(self: Box<Self>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub id: Option<ProductId>,
    pub name: Option<String>,
}

impl ProductFilter {
    pub fn by_id(id: ProductId) -> Self {
        Self { id: Some(id), ..Default::default() }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub mail_list: Vec<String>,
    pub contact: Vec<String>,
}

#[async_trait]
pub trait ProductStore: Send {
    async fn fetch_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>>;
    async fn create_product(&mut self, product: &NewProduct) -> Result<Product>;
    async fn update_product(&mut self, product: &Product) -> Result<()>;
    async fn delete_product(&mut self, id: ProductId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PoolFilter {
    pub id: Option<PoolId>,
    pub ids: Option<Vec<PoolId>>,
    pub name: Option<String>,
    pub product_id: Option<ProductId>,
}

impl PoolFilter {
    pub fn by_id(id: PoolId) -> Self {
        Self { id: Some(id), ..Default::default() }
    }

    pub fn by_ids(ids: Vec<PoolId>) -> Self {
        Self { ids: Some(ids), ..Default::default() }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }

    pub fn by_product(product_id: ProductId) -> Self {
        Self { product_id: Some(product_id), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct NewPool {
    pub name: String,
    pub product_id: ProductId,
    pub tag: PoolTag,
    pub pool_type: PoolType,
    pub instances: Vec<Instance>,
}

#[async_trait]
pub trait PoolStore: Send {
    async fn fetch_pools(&mut self, filter: &PoolFilter) -> Result<Vec<Pool>>;
    async fn create_pool(&mut self, pool: &NewPool) -> Result<Pool>;
    async fn update_pool_instances(&mut self, id: PoolId, instances: &[Instance]) -> Result<()>;
    async fn delete_pool(&mut self, id: PoolId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// BFE clusters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BfeClusterFilter {
    pub name: Option<String>,
    pub pool_id: Option<PoolId>,
}

impl BfeClusterFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }

    pub fn by_pool(pool_id: PoolId) -> Self {
        Self { pool_id: Some(pool_id), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct NewBfeCluster {
    pub name: String,
    pub pool_id: PoolId,
    pub capacity: i64,
    pub enabled: bool,
}

#[async_trait]
pub trait BfeClusterStore: Send {
    /// Ordered by name
    async fn fetch_bfe_clusters(&mut self, filter: &BfeClusterFilter) -> Result<Vec<BfeCluster>>;
    async fn create_bfe_cluster(&mut self, bfe_cluster: &NewBfeCluster) -> Result<BfeCluster>;
    async fn delete_bfe_cluster(&mut self, id: BfeClusterId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Sub-clusters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SubClusterFilter {
    pub id: Option<SubClusterId>,
    pub product_id: Option<ProductId>,
    pub names: Option<Vec<String>>,
    pub cluster_id: Option<ClusterId>,
    pub pool_id: Option<PoolId>,
}

impl SubClusterFilter {
    pub fn by_product(product_id: ProductId) -> Self {
        Self { product_id: Some(product_id), ..Default::default() }
    }

    pub fn by_cluster(cluster_id: ClusterId) -> Self {
        Self { cluster_id: Some(cluster_id), ..Default::default() }
    }

    pub fn by_pool(pool_id: PoolId) -> Self {
        Self { pool_id: Some(pool_id), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct NewSubCluster {
    pub name: String,
    pub product_id: ProductId,
    pub description: String,
    pub pool_id: PoolId,
}

#[derive(Debug, Clone, Default)]
pub struct SubClusterUpdate {
    pub pool_id: Option<PoolId>,
    pub description: Option<String>,
}

#[async_trait]
pub trait SubClusterStore: Send {
    /// Ordered by name
    async fn fetch_sub_clusters(
        &mut self,
        filter: &SubClusterFilter,
    ) -> Result<Vec<SubClusterRecord>>;
    async fn create_sub_cluster(&mut self, sub_cluster: &NewSubCluster) -> Result<SubClusterRecord>;
    async fn update_sub_cluster(
        &mut self,
        id: SubClusterId,
        update: &SubClusterUpdate,
    ) -> Result<()>;
    async fn delete_sub_cluster(&mut self, id: SubClusterId) -> Result<()>;
    /// Mount unmounted sub-clusters on a cluster. Fails with a model
    /// violation when any of them is mounted by the time the write lands.
    async fn bind_sub_clusters(
        &mut self,
        cluster_id: ClusterId,
        ids: &[SubClusterId],
    ) -> Result<()>;
    /// Clear the cluster reference of sub-clusters
    async fn unbind_sub_clusters(&mut self, ids: &[SubClusterId]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ClusterFilter {
    pub id: Option<ClusterId>,
    pub name: Option<String>,
    pub product_id: Option<ProductId>,
}

impl ClusterFilter {
    pub fn by_id(id: ClusterId) -> Self {
        Self { id: Some(id), ..Default::default() }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }

    pub fn by_product(product_id: ProductId) -> Self {
        Self { product_id: Some(product_id), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct NewCluster {
    pub name: String,
    pub product_id: ProductId,
    pub description: String,
    pub basic: ClusterBasic,
    pub sticky_sessions: StickySessions,
    pub passive_health_check: PassiveHealthCheck,
}

#[async_trait]
pub trait ClusterStore: Send {
    /// Ordered by name
    async fn fetch_clusters(&mut self, filter: &ClusterFilter) -> Result<Vec<ClusterRecord>>;
    async fn create_cluster(&mut self, cluster: &NewCluster) -> Result<ClusterRecord>;
    async fn update_cluster(&mut self, cluster: &ClusterRecord) -> Result<()>;
    async fn delete_cluster(&mut self, id: ClusterId) -> Result<()>;
    /// Take the row lock of a cluster until the unit of work ends
    async fn lock_cluster(&mut self, id: ClusterId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// LB matrices
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LbMatrixStore: Send {
    async fn fetch_lb_matrix(&mut self, cluster_id: ClusterId) -> Result<Option<LbMatrix>>;
    async fn upsert_lb_matrix(
        &mut self,
        cluster_id: ClusterId,
        product_id: ProductId,
        matrix: &LbMatrix,
    ) -> Result<()>;
    async fn delete_lb_matrix(&mut self, cluster_id: ClusterId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    pub product_id: Option<ProductId>,
    pub name: Option<String>,
}

impl DomainFilter {
    pub fn by_product(product_id: ProductId) -> Self {
        Self { product_id: Some(product_id), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct NewDomain {
    pub name: String,
    pub product_id: ProductId,
    pub using_advanced_redirect: bool,
    pub using_advanced_hsts: bool,
}

#[async_trait]
pub trait DomainStore: Send {
    /// Ordered by name
    async fn fetch_domains(&mut self, filter: &DomainFilter) -> Result<Vec<Domain>>;
    async fn create_domain(&mut self, domain: &NewDomain) -> Result<Domain>;
    async fn delete_domain(&mut self, id: DomainId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Route rules
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RouteRuleStore: Send {
    /// Take the row lock guarding a product's advanced rules until the unit of
    /// work ends
    async fn lock_advanced_rules(&mut self, product_id: ProductId) -> Result<()>;
    /// Rule sets keyed by product, rules in their stored order. `None` returns
    /// every product that has rules.
    async fn fetch_route_rules(
        &mut self,
        product_id: Option<ProductId>,
    ) -> Result<BTreeMap<ProductId, ProductRouteRule>>;
    async fn delete_route_rules(&mut self, product_id: ProductId) -> Result<()>;
    async fn create_route_rules(
        &mut self,
        product_id: ProductId,
        rules: &ProductRouteRule,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub name: Option<String>,
    pub is_default: Option<bool>,
}

impl CertificateFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }

    /// Only the default certificate
    pub fn default_only() -> Self {
        Self { is_default: Some(true), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub cert_file_path: String,
    pub key_file_path: String,
    pub expired_date: String,
}

#[async_trait]
pub trait CertificateStore: Send {
    /// Ordered by name
    async fn fetch_certificates(&mut self, filter: &CertificateFilter) -> Result<Vec<Certificate>>;
    async fn create_certificate(&mut self, certificate: &NewCertificate) -> Result<Certificate>;
    /// Mark one certificate as the default and clear the flag on all others
    async fn set_default_certificate(&mut self, id: CertificateId) -> Result<()>;
    async fn delete_certificate(&mut self, id: CertificateId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Config version ledger
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ConfigVersionStore: Send {
    /// Serialize version minting for `topic` until the unit of work ends
    async fn lock_topic(&mut self, topic: &str) -> Result<()>;
    async fn latest_config_version(&mut self, topic: &str) -> Result<Option<ConfigVersion>>;
    /// Every ledger row of `topic`, oldest first
    async fn config_version_history(&mut self, topic: &str) -> Result<Vec<ConfigVersion>>;
    /// Append a ledger row. Rows are never updated or deleted.
    async fn append_config_version(&mut self, version: &ConfigVersion) -> Result<()>;
}
