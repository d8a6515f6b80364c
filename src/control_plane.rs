//! Control plane facade
//!
//! Wires every manager over one shared store. The cluster manager gets the
//! route-rule reference checker as its delete checker.

use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, ControlConfig};
use crate::errors::Result;
use crate::export::ExportService;
use crate::services::{
    BfeClusterService, CertificateService, ClusterDeleteChecker, ClusterService, DomainService,
    PoolService, ProductService, RouteRuleClusterChecker, RouteRuleService, SubClusterService,
};
use crate::storage::{open_store, Store};

pub struct ControlPlane {
    products: ProductService,
    bfe_clusters: BfeClusterService,
    pools: PoolService,
    sub_clusters: SubClusterService,
    clusters: ClusterService,
    domains: DomainService,
    route_rules: RouteRuleService,
    certificates: CertificateService,
    exports: ExportService,
}

impl ControlPlane {
    pub fn new(store: Arc<dyn Store>, config: ControlConfig) -> Self {
        let ignore = config.ignore_readiness_check;
        let checkers: Vec<Arc<dyn ClusterDeleteChecker>> = vec![Arc::new(RouteRuleClusterChecker)];

        Self {
            products: ProductService::new(store.clone()),
            bfe_clusters: BfeClusterService::new(store.clone()),
            pools: PoolService::new(store.clone()),
            sub_clusters: SubClusterService::new(store.clone()),
            clusters: ClusterService::new(store.clone(), checkers, ignore),
            domains: DomainService::new(store.clone()),
            route_rules: RouteRuleService::new(store.clone(), ignore),
            certificates: CertificateService::new(store.clone()),
            exports: ExportService::new(store, config.default_product),
        }
    }

    /// Open the configured store and build the facade over it
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = open_store(&config.database).await?;
        info!(
            ignore_readiness_check = config.control.ignore_readiness_check,
            default_product = ?config.control.default_product,
            "Control plane ready"
        );
        Ok(Self::new(store, config.control.clone()))
    }

    pub fn products(&self) -> &ProductService {
        &self.products
    }

    pub fn bfe_clusters(&self) -> &BfeClusterService {
        &self.bfe_clusters
    }

    pub fn pools(&self) -> &PoolService {
        &self.pools
    }

    pub fn sub_clusters(&self) -> &SubClusterService {
        &self.sub_clusters
    }

    pub fn clusters(&self) -> &ClusterService {
        &self.clusters
    }

    pub fn domains(&self) -> &DomainService {
        &self.domains
    }

    pub fn route_rules(&self) -> &RouteRuleService {
        &self.route_rules
    }

    pub fn certificates(&self) -> &CertificateService {
        &self.certificates
    }

    pub fn exports(&self) -> &ExportService {
        &self.exports
    }
}
