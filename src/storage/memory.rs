//! In-memory store
//!
//! The whole state sits behind one `tokio::sync::Mutex`. A unit of work holds
//! the lock for its lifetime and mutates a private copy of the state, which
//! `commit` writes back. Units of work are therefore fully serialized and a
//! dropped unit of work leaves no trace. The row and topic locks of the
//! [`StoreTx`] contract are implied by the global lock.

use super::traits::*;
use crate::domain::{
    BfeCluster, BfeClusterId, Certificate, CertificateId, ClusterId, ClusterRecord, ConfigVersion,
    Domain, DomainId, Instance, LbMatrix, Pool, PoolId, Product, ProductId, ProductRouteRule,
    SubClusterId, SubClusterRecord, BUILTIN_PRODUCT_ID,
};
use crate::errors::{Result, SwitchyardError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

#[derive(Debug, Clone)]
struct MemoryState {
    next_id: i64,
    products: BTreeMap<ProductId, Product>,
    pools: BTreeMap<PoolId, Pool>,
    bfe_clusters: BTreeMap<BfeClusterId, BfeCluster>,
    sub_clusters: BTreeMap<SubClusterId, SubClusterRecord>,
    clusters: BTreeMap<ClusterId, ClusterRecord>,
    lb_matrices: BTreeMap<ClusterId, (ProductId, LbMatrix)>,
    domains: BTreeMap<DomainId, Domain>,
    route_rules: BTreeMap<ProductId, ProductRouteRule>,
    certificates: BTreeMap<CertificateId, Certificate>,
    config_versions: Vec<ConfigVersion>,
}

impl Default for MemoryState {
    fn default() -> Self {
        let builtin = Product::builtin();
        Self {
            next_id: BUILTIN_PRODUCT_ID.get() + 1,
            products: BTreeMap::from([(builtin.id, builtin)]),
            pools: BTreeMap::new(),
            bfe_clusters: BTreeMap::new(),
            sub_clusters: BTreeMap::new(),
            clusters: BTreeMap::new(),
            lb_matrices: BTreeMap::new(),
            domains: BTreeMap::new(),
            route_rules: BTreeMap::new(),
            certificates: BTreeMap::new(),
            config_versions: Vec::new(),
        }
    }
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Store keeping all state in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Empty store holding only the built-in product
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }
}

/// Unit of work over a [`MemoryStore`]
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

fn sorted_by_name<T, F: Fn(&T) -> &str>(mut items: Vec<T>, name: F) -> Vec<T> {
    items.sort_by(|a, b| name(a).cmp(name(b)));
    items
}

#[async_trait]
impl ProductStore for MemoryTx {
    #[instrument(skip(self), name = "mem_fetch_products")]
    async fn fetch_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let products: Vec<Product> = self
            .work
            .products
            .values()
            .filter(|p| filter.id.map_or(true, |id| p.id == id))
            .filter(|p| filter.name.as_deref().map_or(true, |name| p.name == name))
            .cloned()
            .collect();
        Ok(sorted_by_name(products, |p| p.name.as_str()))
    }

    #[instrument(skip(self), name = "mem_create_product")]
    async fn create_product(&mut self, product: &NewProduct) -> Result<Product> {
        let id = ProductId::new(self.work.next_id());
        let created = Product {
            id,
            name: product.name.clone(),
            description: product.description.clone(),
            mail_list: product.mail_list.clone(),
            contact: product.contact.clone(),
        };
        self.work.products.insert(id, created.clone());
        Ok(created)
    }

    #[instrument(skip(self), name = "mem_update_product")]
    async fn update_product(&mut self, product: &Product) -> Result<()> {
        match self.work.products.get_mut(&product.id) {
            Some(existing) => {
                *existing = product.clone();
                Ok(())
            }
            None => Err(SwitchyardError::not_exist("Product", product.id)),
        }
    }

    #[instrument(skip(self), name = "mem_delete_product")]
    async fn delete_product(&mut self, id: ProductId) -> Result<()> {
        self.work.products.remove(&id).map(|_| ()).ok_or_else(|| {
            SwitchyardError::not_exist("Product", id)
        })
    }
}

#[async_trait]
impl PoolStore for MemoryTx {
    #[instrument(skip(self), name = "mem_fetch_pools")]
    async fn fetch_pools(&mut self, filter: &PoolFilter) -> Result<Vec<Pool>> {
        let pools: Vec<Pool> = self
            .work
            .pools
            .values()
            .filter(|p| filter.id.map_or(true, |id| p.id == id))
            .filter(|p| filter.ids.as_ref().map_or(true, |ids| ids.contains(&p.id)))
            .filter(|p| filter.name.as_deref().map_or(true, |name| p.name == name))
            .filter(|p| filter.product_id.map_or(true, |id| p.product_id == id))
            .cloned()
            .collect();
        Ok(sorted_by_name(pools, |p| p.name.as_str()))
    }

    #[instrument(skip(self, pool), fields(pool_name = %pool.name), name = "mem_create_pool")]
    async fn create_pool(&mut self, pool: &NewPool) -> Result<Pool> {
        let id = PoolId::new(self.work.next_id());
        let created = Pool {
            id,
            name: pool.name.clone(),
            product_id: pool.product_id,
            tag: pool.tag,
            pool_type: pool.pool_type,
            instances: pool.instances.clone(),
        };
        self.work.pools.insert(id, created.clone());
        Ok(created)
    }

    #[instrument(skip(self, instances), name = "mem_update_pool_instances")]
    async fn update_pool_instances(&mut self, id: PoolId, instances: &[Instance]) -> Result<()> {
        let pool = self.work.pools.get_mut(&id).ok_or_else(|| {
            SwitchyardError::not_exist("Pool", id)
        })?;
        pool.instances = instances.to_vec();
        Ok(())
    }

    #[instrument(skip(self), name = "mem_delete_pool")]
    async fn delete_pool(&mut self, id: PoolId) -> Result<()> {
        self.work.pools.remove(&id).map(|_| ()).ok_or_else(|| {
            SwitchyardError::not_exist("Pool", id)
        })
    }
}

#[async_trait]
impl BfeClusterStore for MemoryTx {
    #[instrument(skip(self), name = "mem_fetch_bfe_clusters")]
    async fn fetch_bfe_clusters(&mut self, filter: &BfeClusterFilter) -> Result<Vec<BfeCluster>> {
        let bfe_clusters: Vec<BfeCluster> = self
            .work
            .bfe_clusters
            .values()
            .filter(|b| filter.name.as_deref().map_or(true, |name| b.name == name))
            .filter(|b| filter.pool_id.map_or(true, |id| b.pool_id == id))
            .cloned()
            .collect();
        Ok(sorted_by_name(bfe_clusters, |b| b.name.as_str()))
    }

    #[instrument(skip(self), name = "mem_create_bfe_cluster")]
    async fn create_bfe_cluster(&mut self, bfe_cluster: &NewBfeCluster) -> Result<BfeCluster> {
        let id = BfeClusterId::new(self.work.next_id());
        let created = BfeCluster {
            id,
            name: bfe_cluster.name.clone(),
            pool_id: bfe_cluster.pool_id,
            capacity: bfe_cluster.capacity,
            enabled: bfe_cluster.enabled,
        };
        self.work.bfe_clusters.insert(id, created.clone());
        Ok(created)
    }

    #[instrument(skip(self), name = "mem_delete_bfe_cluster")]
    async fn delete_bfe_cluster(&mut self, id: BfeClusterId) -> Result<()> {
        self.work.bfe_clusters.remove(&id).map(|_| ()).ok_or_else(|| {
            SwitchyardError::not_exist("BfeCluster", id)
        })
    }
}

#[async_trait]
impl SubClusterStore for MemoryTx {
    #[instrument(skip(self), name = "mem_fetch_sub_clusters")]
    async fn fetch_sub_clusters(
        &mut self,
        filter: &SubClusterFilter,
    ) -> Result<Vec<SubClusterRecord>> {
        let sub_clusters: Vec<SubClusterRecord> = self
            .work
            .sub_clusters
            .values()
            .filter(|s| filter.id.map_or(true, |id| s.id == id))
            .filter(|s| filter.product_id.map_or(true, |id| s.product_id == id))
            .filter(|s| filter.names.as_ref().map_or(true, |names| names.contains(&s.name)))
            .filter(|s| filter.cluster_id.map_or(true, |id| s.cluster_id == Some(id)))
            .filter(|s| filter.pool_id.map_or(true, |id| s.pool_id == id))
            .cloned()
            .collect();
        Ok(sorted_by_name(sub_clusters, |s| s.name.as_str()))
    }

    #[instrument(skip(self), name = "mem_create_sub_cluster")]
    async fn create_sub_cluster(
        &mut self,
        sub_cluster: &NewSubCluster,
    ) -> Result<SubClusterRecord> {
        let id = SubClusterId::new(self.work.next_id());
        let created = SubClusterRecord {
            id,
            name: sub_cluster.name.clone(),
            product_id: sub_cluster.product_id,
            description: sub_cluster.description.clone(),
            pool_id: sub_cluster.pool_id,
            cluster_id: None,
        };
        self.work.sub_clusters.insert(id, created.clone());
        Ok(created)
    }

    #[instrument(skip(self), name = "mem_update_sub_cluster")]
    async fn update_sub_cluster(
        &mut self,
        id: SubClusterId,
        update: &SubClusterUpdate,
    ) -> Result<()> {
        let record = self.work.sub_clusters.get_mut(&id).ok_or_else(|| {
            SwitchyardError::not_exist("SubCluster", id)
        })?;
        if let Some(pool_id) = update.pool_id {
            record.pool_id = pool_id;
        }
        if let Some(description) = &update.description {
            record.description = description.clone();
        }
        Ok(())
    }

    #[instrument(skip(self), name = "mem_delete_sub_cluster")]
    async fn delete_sub_cluster(&mut self, id: SubClusterId) -> Result<()> {
        self.work.sub_clusters.remove(&id).map(|_| ()).ok_or_else(|| {
            SwitchyardError::not_exist("SubCluster", id)
        })
    }

    #[instrument(skip(self), name = "mem_bind_sub_clusters")]
    async fn bind_sub_clusters(
        &mut self,
        cluster_id: ClusterId,
        ids: &[SubClusterId],
    ) -> Result<()> {
        for id in ids {
            let record = self.work.sub_clusters.get_mut(id).ok_or_else(|| {
                SwitchyardError::not_exist("SubCluster", id)
            })?;
            if let Some(mounted) = record.cluster_id {
                return Err(SwitchyardError::model(format!(
                    "Sub cluster '{}' is already mounted to cluster {}",
                    record.name, mounted
                )));
            }
            record.cluster_id = Some(cluster_id);
        }
        Ok(())
    }

    #[instrument(skip(self), name = "mem_unbind_sub_clusters")]
    async fn unbind_sub_clusters(&mut self, ids: &[SubClusterId]) -> Result<()> {
        for id in ids {
            let record = self.work.sub_clusters.get_mut(id).ok_or_else(|| {
                SwitchyardError::not_exist("SubCluster", id)
            })?;
            record.cluster_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for MemoryTx {
    #[instrument(skip(self), name = "mem_fetch_clusters")]
    async fn fetch_clusters(&mut self, filter: &ClusterFilter) -> Result<Vec<ClusterRecord>> {
        let clusters: Vec<ClusterRecord> = self
            .work
            .clusters
            .values()
            .filter(|c| filter.id.map_or(true, |id| c.id == id))
            .filter(|c| filter.name.as_deref().map_or(true, |name| c.name == name))
            .filter(|c| filter.product_id.map_or(true, |id| c.product_id == id))
            .cloned()
            .collect();
        Ok(sorted_by_name(clusters, |c| c.name.as_str()))
    }

    #[instrument(
        skip(self, cluster),
        fields(cluster_name = %cluster.name),
        name = "mem_create_cluster"
    )]
    async fn create_cluster(&mut self, cluster: &NewCluster) -> Result<ClusterRecord> {
        let id = ClusterId::new(self.work.next_id());
        let created = ClusterRecord {
            id,
            name: cluster.name.clone(),
            product_id: cluster.product_id,
            description: cluster.description.clone(),
            basic: cluster.basic.clone(),
            sticky_sessions: cluster.sticky_sessions.clone(),
            passive_health_check: cluster.passive_health_check.clone(),
        };
        self.work.clusters.insert(id, created.clone());
        Ok(created)
    }

    #[instrument(
        skip(self, cluster),
        fields(cluster_id = %cluster.id),
        name = "mem_update_cluster"
    )]
    async fn update_cluster(&mut self, cluster: &ClusterRecord) -> Result<()> {
        let existing = self.work.clusters.get_mut(&cluster.id).ok_or_else(|| {
            SwitchyardError::not_exist("Cluster", cluster.id)
        })?;
        *existing = cluster.clone();
        Ok(())
    }

    #[instrument(skip(self), name = "mem_delete_cluster")]
    async fn delete_cluster(&mut self, id: ClusterId) -> Result<()> {
        self.work.clusters.remove(&id).map(|_| ()).ok_or_else(|| {
            SwitchyardError::not_exist("Cluster", id)
        })
    }

    async fn lock_cluster(&mut self, _id: ClusterId) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LbMatrixStore for MemoryTx {
    #[instrument(skip(self), name = "mem_fetch_lb_matrix")]
    async fn fetch_lb_matrix(&mut self, cluster_id: ClusterId) -> Result<Option<LbMatrix>> {
        Ok(self.work.lb_matrices.get(&cluster_id).map(|(_, matrix)| matrix.clone()))
    }

    #[instrument(skip(self, matrix), name = "mem_upsert_lb_matrix")]
    async fn upsert_lb_matrix(
        &mut self,
        cluster_id: ClusterId,
        product_id: ProductId,
        matrix: &LbMatrix,
    ) -> Result<()> {
        self.work.lb_matrices.insert(cluster_id, (product_id, matrix.clone()));
        Ok(())
    }

    #[instrument(skip(self), name = "mem_delete_lb_matrix")]
    async fn delete_lb_matrix(&mut self, cluster_id: ClusterId) -> Result<()> {
        self.work.lb_matrices.remove(&cluster_id);
        Ok(())
    }
}

#[async_trait]
impl DomainStore for MemoryTx {
    #[instrument(skip(self), name = "mem_fetch_domains")]
    async fn fetch_domains(&mut self, filter: &DomainFilter) -> Result<Vec<Domain>> {
        let domains: Vec<Domain> = self
            .work
            .domains
            .values()
            .filter(|d| filter.product_id.map_or(true, |id| d.product_id == id))
            .filter(|d| filter.name.as_deref().map_or(true, |name| d.name == name))
            .cloned()
            .collect();
        Ok(sorted_by_name(domains, |d| d.name.as_str()))
    }

    #[instrument(skip(self), name = "mem_create_domain")]
    async fn create_domain(&mut self, domain: &NewDomain) -> Result<Domain> {
        let id = DomainId::new(self.work.next_id());
        let created = Domain {
            id,
            name: domain.name.clone(),
            product_id: domain.product_id,
            using_advanced_redirect: domain.using_advanced_redirect,
            using_advanced_hsts: domain.using_advanced_hsts,
        };
        self.work.domains.insert(id, created.clone());
        Ok(created)
    }

    #[instrument(skip(self), name = "mem_delete_domain")]
    async fn delete_domain(&mut self, id: DomainId) -> Result<()> {
        self.work.domains.remove(&id).map(|_| ()).ok_or_else(|| {
            SwitchyardError::not_exist("Domain", id)
        })
    }
}

#[async_trait]
impl RouteRuleStore for MemoryTx {
    async fn lock_advanced_rules(&mut self, _product_id: ProductId) -> Result<()> {
        Ok(())
    }

    #[instrument(skip(self), name = "mem_fetch_route_rules")]
    async fn fetch_route_rules(
        &mut self,
        product_id: Option<ProductId>,
    ) -> Result<BTreeMap<ProductId, ProductRouteRule>> {
        Ok(self
            .work
            .route_rules
            .iter()
            .filter(|(id, _)| product_id.map_or(true, |wanted| **id == wanted))
            .map(|(id, rules)| (*id, rules.clone()))
            .collect())
    }

    #[instrument(skip(self), name = "mem_delete_route_rules")]
    async fn delete_route_rules(&mut self, product_id: ProductId) -> Result<()> {
        self.work.route_rules.remove(&product_id);
        Ok(())
    }

    #[instrument(skip(self, rules), name = "mem_create_route_rules")]
    async fn create_route_rules(
        &mut self,
        product_id: ProductId,
        rules: &ProductRouteRule,
    ) -> Result<()> {
        let entry = self.work.route_rules.entry(product_id).or_default();
        entry.basic_rules.extend(rules.basic_rules.iter().cloned());
        entry.advanced_rules.extend(rules.advanced_rules.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl CertificateStore for MemoryTx {
    #[instrument(skip(self), name = "mem_fetch_certificates")]
    async fn fetch_certificates(&mut self, filter: &CertificateFilter) -> Result<Vec<Certificate>> {
        let certificates: Vec<Certificate> = self
            .work
            .certificates
            .values()
            .filter(|c| filter.name.as_deref().map_or(true, |name| c.name == name))
            .filter(|c| filter.is_default.map_or(true, |is_default| c.is_default == is_default))
            .cloned()
            .collect();
        Ok(sorted_by_name(certificates, |c| c.name.as_str()))
    }

    #[instrument(
        skip(self, certificate),
        fields(certificate_name = %certificate.name),
        name = "mem_create_certificate"
    )]
    async fn create_certificate(&mut self, certificate: &NewCertificate) -> Result<Certificate> {
        let id = CertificateId::new(self.work.next_id());
        let created = Certificate {
            id,
            name: certificate.name.clone(),
            description: certificate.description.clone(),
            is_default: certificate.is_default,
            cert_file_path: certificate.cert_file_path.clone(),
            key_file_path: certificate.key_file_path.clone(),
            expired_date: certificate.expired_date.clone(),
        };
        self.work.certificates.insert(id, created.clone());
        Ok(created)
    }

    #[instrument(skip(self), name = "mem_set_default_certificate")]
    async fn set_default_certificate(&mut self, id: CertificateId) -> Result<()> {
        if !self.work.certificates.contains_key(&id) {
            return Err(SwitchyardError::not_exist("Certificate", id));
        }
        for certificate in self.work.certificates.values_mut() {
            certificate.is_default = certificate.id == id;
        }
        Ok(())
    }

    #[instrument(skip(self), name = "mem_delete_certificate")]
    async fn delete_certificate(&mut self, id: CertificateId) -> Result<()> {
        self.work.certificates.remove(&id).map(|_| ()).ok_or_else(|| {
            SwitchyardError::not_exist("Certificate", id)
        })
    }
}

#[async_trait]
impl ConfigVersionStore for MemoryTx {
    async fn lock_topic(&mut self, _topic: &str) -> Result<()> {
        Ok(())
    }

    #[instrument(skip(self), name = "mem_latest_config_version")]
    async fn latest_config_version(&mut self, topic: &str) -> Result<Option<ConfigVersion>> {
        Ok(self.work.config_versions.iter().rev().find(|v| v.topic == topic).cloned())
    }

    #[instrument(skip(self), name = "mem_config_version_history")]
    async fn config_version_history(&mut self, topic: &str) -> Result<Vec<ConfigVersion>> {
        Ok(self.work.config_versions.iter().filter(|v| v.topic == topic).cloned().collect())
    }

    #[instrument(
        skip(self, version),
        fields(topic = %version.topic, version = %version.version),
        name = "mem_append_config_version"
    )]
    async fn append_config_version(&mut self, version: &ConfigVersion) -> Result<()> {
        self.work.config_versions.push(version.clone());
        Ok(())
    }
}
