//! Cluster business logic service
//!
//! Owns the cluster aggregate: backend policies, the bound sub-cluster set
//! and the LB matrix scheduling traffic between them. Every read-then-write
//! runs in one unit of work, so a failed validation leaves the stored state
//! untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::Validate;

use super::lookup::{
    assemble_cluster, bfe_cluster_names, require_cluster, require_locked_cluster, require_product,
    resolve_sub_clusters,
};
use super::validation::validate_entity_name;
use crate::domain::{
    is_reserved_cluster_name, Cluster, ClusterBasic, LbMatrix, PassiveHealthCheck, Product,
    StickySessions, SubCluster,
};
use crate::errors::{Result, SwitchyardError};
use crate::storage::{ClusterFilter, NewCluster, Store, StoreTx, SubClusterFilter};

/// Veto over cluster deletion, consulted inside the deleting unit of work
#[async_trait]
pub trait ClusterDeleteChecker: Send + Sync {
    /// Name reported when the checker vetoes a deletion
    fn name(&self) -> &str;

    /// `Some(reason)` when the cluster must not be deleted
    async fn check(
        &self,
        tx: &mut dyn StoreTx,
        product: &Product,
        cluster: &Cluster,
    ) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateClusterRequest {
    #[validate(custom(function = "validate_entity_name"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub description: String,
    #[serde(default)]
    #[validate(nested)]
    pub basic: ClusterBasic,
    #[serde(default)]
    pub sticky_sessions: StickySessions,
    #[serde(default)]
    #[validate(nested)]
    pub passive_health_check: PassiveHealthCheck,
    /// Names of sub-clusters in the same product
    pub sub_clusters: Vec<String>,
    /// Explicit LB matrix; the default split is used when absent
    pub scheduler: Option<LbMatrix>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateClusterRequest {
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    #[validate(nested)]
    pub basic: Option<ClusterBasic>,
    pub sticky_sessions: Option<StickySessions>,
    #[validate(nested)]
    pub passive_health_check: Option<PassiveHealthCheck>,
    pub scheduler: Option<LbMatrix>,
}

/// Service for managing clusters
pub struct ClusterService {
    store: Arc<dyn Store>,
    delete_checkers: Vec<Arc<dyn ClusterDeleteChecker>>,
    ignore_readiness_check: bool,
}

impl ClusterService {
    pub fn new(
        store: Arc<dyn Store>,
        delete_checkers: Vec<Arc<dyn ClusterDeleteChecker>>,
        ignore_readiness_check: bool,
    ) -> Self {
        Self { store, delete_checkers, ignore_readiness_check }
    }

    #[instrument(skip(self, request), fields(cluster = %request.name), name = "create_cluster")]
    pub async fn create_cluster(
        &self,
        product_name: &str,
        request: CreateClusterRequest,
    ) -> Result<Cluster> {
        request.validate()?;
        if is_reserved_cluster_name(&request.name) {
            return Err(SwitchyardError::param_field(
                format!("Cluster name '{}' is reserved", request.name),
                "name",
            ));
        }
        check_sticky_sessions(&request.sticky_sessions)?;
        let names = unique_names(&request.sub_clusters)?;

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;

        if !tx.fetch_clusters(&ClusterFilter::by_name(&request.name)).await?.is_empty() {
            return Err(SwitchyardError::existed("Cluster", &request.name));
        }

        let sub_clusters = self.require_bindable(&mut *tx, &product, &names).await?;
        let bfe_clusters = bfe_cluster_names(&mut *tx).await?;
        let scheduler = request
            .scheduler
            .unwrap_or_else(|| LbMatrix::default_for(&bfe_clusters, &names));
        scheduler.check(&bfe_clusters, &names)?;

        let record = tx
            .create_cluster(&NewCluster {
                name: request.name,
                product_id: product.id,
                description: request.description,
                basic: request.basic,
                sticky_sessions: request.sticky_sessions,
                passive_health_check: request.passive_health_check,
            })
            .await?;
        let ids: Vec<_> = sub_clusters.iter().map(|s| s.id).collect();
        tx.bind_sub_clusters(record.id, &ids).await?;
        tx.upsert_lb_matrix(record.id, product.id, &scheduler).await?;

        let cluster = assemble_cluster(&mut *tx, record, self.ignore_readiness_check).await?;
        tx.commit().await?;

        info!(
            cluster_id = %cluster.id,
            cluster = %cluster.name,
            product = %product.name,
            sub_clusters = cluster.sub_clusters.len(),
            "Cluster created"
        );
        Ok(cluster)
    }

    /// Partial update. A supplied scheduler replaces the stored matrix after
    /// being checked against the currently bound sub-clusters.
    #[instrument(skip(self, request), name = "update_cluster")]
    pub async fn update_cluster(
        &self,
        product_name: &str,
        cluster_name: &str,
        request: UpdateClusterRequest,
    ) -> Result<Cluster> {
        request.validate()?;
        if let Some(sticky) = &request.sticky_sessions {
            check_sticky_sessions(sticky)?;
        }

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let mut record = require_locked_cluster(&mut *tx, &product, cluster_name).await?;

        if let Some(description) = request.description {
            record.description = description;
        }
        if let Some(basic) = request.basic {
            record.basic = basic;
        }
        if let Some(sticky_sessions) = request.sticky_sessions {
            record.sticky_sessions = sticky_sessions;
        }
        if let Some(passive_health_check) = request.passive_health_check {
            record.passive_health_check = passive_health_check;
        }

        if let Some(matrix) = request.scheduler {
            let bound: Vec<String> = tx
                .fetch_sub_clusters(&SubClusterFilter::by_cluster(record.id))
                .await?
                .into_iter()
                .map(|s| s.name)
                .collect();
            let bfe_clusters = bfe_cluster_names(&mut *tx).await?;
            matrix.check(&bfe_clusters, &bound)?;
            tx.upsert_lb_matrix(record.id, product.id, &matrix).await?;
        }

        tx.update_cluster(&record).await?;
        let cluster = assemble_cluster(&mut *tx, record, self.ignore_readiness_check).await?;
        tx.commit().await?;

        info!(cluster_id = %cluster.id, cluster = %cluster.name, "Cluster updated");
        Ok(cluster)
    }

    /// Replace the bound sub-cluster set.
    ///
    /// Sub-clusters being unbound must already be drained to 0% in every
    /// row; newly bound ones enter every row at 0%.
    #[instrument(
        skip(self, sub_cluster_names),
        fields(target = sub_cluster_names.len()),
        name = "rebind_sub_clusters"
    )]
    pub async fn rebind_sub_clusters(
        &self,
        product_name: &str,
        cluster_name: &str,
        sub_cluster_names: Vec<String>,
    ) -> Result<Cluster> {
        let target = unique_names(&sub_cluster_names)?;

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let record = require_locked_cluster(&mut *tx, &product, cluster_name).await?;

        let current = tx.fetch_sub_clusters(&SubClusterFilter::by_cluster(record.id)).await?;
        let current_names: BTreeSet<&str> = current.iter().map(|s| s.name.as_str()).collect();
        let target_names: BTreeSet<&str> = target.iter().map(String::as_str).collect();

        let removed: Vec<&str> = current_names.difference(&target_names).copied().collect();
        let added: Vec<String> = target_names
            .difference(&current_names)
            .map(|s| s.to_string())
            .collect();
        let removed_ids: Vec<_> = current
            .iter()
            .filter(|s| removed.contains(&s.name.as_str()))
            .map(|s| s.id)
            .collect();

        let added_sub_clusters = self.require_bindable(&mut *tx, &product, &added).await?;

        let matrix = tx.fetch_lb_matrix(record.id).await?.ok_or_else(|| {
            SwitchyardError::dirty(format!("Cluster '{}' has no stored LB matrix", record.name))
        })?;
        let rebound = matrix.rebind(&removed, &added)?;
        let bfe_clusters = bfe_cluster_names(&mut *tx).await?;
        rebound.check(&bfe_clusters, &target)?;

        debug!(removed = ?removed, added = ?added, "Rebinding sub clusters");
        tx.unbind_sub_clusters(&removed_ids).await?;
        let added_ids: Vec<_> = added_sub_clusters.iter().map(|s| s.id).collect();
        tx.bind_sub_clusters(record.id, &added_ids).await?;
        tx.upsert_lb_matrix(record.id, product.id, &rebound).await?;

        let cluster = assemble_cluster(&mut *tx, record, self.ignore_readiness_check).await?;
        tx.commit().await?;

        info!(
            cluster_id = %cluster.id,
            cluster = %cluster.name,
            removed = removed_ids.len(),
            added = added_ids.len(),
            "Sub clusters rebound"
        );
        Ok(cluster)
    }

    /// Delete a cluster once every delete checker agrees. Bound sub-clusters
    /// are released and the matrix removed with it.
    #[instrument(skip(self), name = "delete_cluster")]
    pub async fn delete_cluster(&self, product_name: &str, cluster_name: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let record = require_locked_cluster(&mut *tx, &product, cluster_name).await?;
        let cluster = assemble_cluster(&mut *tx, record, self.ignore_readiness_check).await?;

        for checker in &self.delete_checkers {
            if let Some(reason) = checker.check(&mut *tx, &product, &cluster).await? {
                return Err(SwitchyardError::model(format!(
                    "Cluster '{}' cannot be deleted ({}): {}",
                    cluster.name,
                    checker.name(),
                    reason
                )));
            }
        }

        let ids: Vec<_> = cluster.sub_clusters.iter().map(|s| s.id).collect();
        tx.unbind_sub_clusters(&ids).await?;
        tx.delete_lb_matrix(cluster.id).await?;
        tx.delete_cluster(cluster.id).await?;
        tx.commit().await?;

        info!(
            cluster_id = %cluster.id,
            cluster = %cluster.name,
            released = ids.len(),
            "Cluster deleted"
        );
        Ok(())
    }

    pub async fn fetch_cluster(&self, product_name: &str, cluster_name: &str) -> Result<Cluster> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let record = require_cluster(&mut *tx, &product, cluster_name).await?;
        assemble_cluster(&mut *tx, record, self.ignore_readiness_check).await
    }

    pub async fn fetch_clusters(&self, product_name: &str) -> Result<Vec<Cluster>> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let records = tx.fetch_clusters(&ClusterFilter::by_product(product.id)).await?;

        let mut clusters = Vec::with_capacity(records.len());
        for record in records {
            clusters.push(assemble_cluster(&mut *tx, record, self.ignore_readiness_check).await?);
        }
        Ok(clusters)
    }

    /// Resolve sub-clusters about to be bound: they must exist in the
    /// product, be unmounted and, unless readiness checks are off, ready.
    async fn require_bindable(
        &self,
        tx: &mut dyn StoreTx,
        product: &Product,
        names: &[String],
    ) -> Result<Vec<SubCluster>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let records = tx
            .fetch_sub_clusters(&SubClusterFilter {
                product_id: Some(product.id),
                names: Some(names.to_vec()),
                ..Default::default()
            })
            .await?;
        if let Some(missing) = names.iter().find(|name| !records.iter().any(|r| &r.name == *name)) {
            return Err(SwitchyardError::not_exist("SubCluster", missing));
        }

        let sub_clusters = resolve_sub_clusters(tx, records).await?;
        for sub_cluster in &sub_clusters {
            if let Some(cluster_id) = sub_cluster.cluster_id {
                return Err(SwitchyardError::model(format!(
                    "Sub cluster '{}' is already mounted to cluster {}",
                    sub_cluster.name, cluster_id
                )));
            }
            if !self.ignore_readiness_check && !sub_cluster.ready() {
                return Err(SwitchyardError::unready(format!(
                    "Sub cluster '{}' is not ready: pool '{}' has no routable instance",
                    sub_cluster.name, sub_cluster.pool.name
                )));
            }
        }
        Ok(sub_clusters)
    }
}

/// Non-empty, duplicate-free sub-cluster list, in request order
fn unique_names(names: &[String]) -> Result<Vec<String>> {
    if names.is_empty() {
        return Err(SwitchyardError::model("A cluster must have at least one sub cluster"));
    }

    let mut seen = BTreeSet::new();
    if let Some(duplicate) = names.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(SwitchyardError::param_field(
            format!("Sub cluster '{}' is listed more than once", duplicate),
            "sub_clusters",
        ));
    }
    Ok(names.to_vec())
}

fn check_sticky_sessions(sticky: &StickySessions) -> Result<()> {
    let has_header = sticky.hash_header.as_deref().is_some_and(|h| !h.trim().is_empty());
    if sticky.hash_strategy.uses_header() && !has_header {
        return Err(SwitchyardError::param_field(
            "Hash strategies keyed on a client id need a hash header",
            "sticky_sessions.hash_header",
        ));
    }
    Ok(())
}
