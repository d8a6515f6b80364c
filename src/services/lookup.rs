//! Lookups shared by the services, all running inside a caller's unit of work

use crate::domain::{
    BfeCluster, Cluster, ClusterRecord, Pool, PoolId, Product, SubCluster, SubClusterRecord,
};
use crate::errors::{Result, SwitchyardError};
use crate::storage::{
    BfeClusterFilter, ClusterFilter, PoolFilter, ProductFilter, StoreTx, SubClusterFilter,
};
use std::collections::BTreeMap;

pub(crate) async fn require_product(tx: &mut dyn StoreTx, name: &str) -> Result<Product> {
    tx.fetch_products(&ProductFilter::by_name(name))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| SwitchyardError::not_exist("Product", name))
}

/// Pool by fully qualified name
pub(crate) async fn require_pool(tx: &mut dyn StoreTx, name: &str) -> Result<Pool> {
    tx.fetch_pools(&PoolFilter::by_name(name))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| SwitchyardError::not_exist("Pool", name))
}

/// Cluster by name within `product`
pub(crate) async fn require_cluster(
    tx: &mut dyn StoreTx,
    product: &Product,
    name: &str,
) -> Result<ClusterRecord> {
    tx.fetch_clusters(&ClusterFilter {
        name: Some(name.to_string()),
        product_id: Some(product.id),
        ..Default::default()
    })
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| SwitchyardError::not_exist("Cluster", name))
}

/// Cluster by name within `product`, row-locked and re-read so that writers
/// of its bindings and matrix serialize
pub(crate) async fn require_locked_cluster(
    tx: &mut dyn StoreTx,
    product: &Product,
    name: &str,
) -> Result<ClusterRecord> {
    let record = require_cluster(tx, product, name).await?;
    tx.lock_cluster(record.id).await?;
    tx.fetch_clusters(&ClusterFilter::by_id(record.id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| SwitchyardError::not_exist("Cluster", name))
}

/// Sub-cluster by name within `product`
pub(crate) async fn require_sub_cluster(
    tx: &mut dyn StoreTx,
    product: &Product,
    name: &str,
) -> Result<SubClusterRecord> {
    tx.fetch_sub_clusters(&SubClusterFilter {
        product_id: Some(product.id),
        names: Some(vec![name.to_string()]),
        ..Default::default()
    })
    .await?
    .into_iter()
    .next()
    .ok_or_else(|| SwitchyardError::not_exist("SubCluster", name))
}

/// Attach pools to sub-cluster records. A record pointing at a missing pool
/// is a broken foreign key.
pub(crate) async fn resolve_sub_clusters(
    tx: &mut dyn StoreTx,
    records: Vec<SubClusterRecord>,
) -> Result<Vec<SubCluster>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let pool_ids: Vec<PoolId> = records.iter().map(|r| r.pool_id).collect();
    let pools: BTreeMap<PoolId, Pool> =
        tx
            .fetch_pools(&PoolFilter::by_ids(pool_ids))
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

    records
        .into_iter()
        .map(|record| {
            let pool = pools.get(&record.pool_id).cloned().ok_or_else(|| {
                SwitchyardError::dirty(format!(
                    "Sub cluster '{}' references missing pool {}",
                    record.name, record.pool_id
                ))
            })?;
            Ok(SubCluster::from_record(record, pool))
        })
        .collect()
}

/// Build the cluster aggregate from its record
pub(crate) async fn assemble_cluster(
    tx: &mut dyn StoreTx,
    record: ClusterRecord,
    ignore_readiness_check: bool,
) -> Result<Cluster> {
    let records = tx.fetch_sub_clusters(&SubClusterFilter::by_cluster(record.id)).await?;
    let sub_clusters = resolve_sub_clusters(tx, records).await?;
    let scheduler = tx.fetch_lb_matrix(record.id).await?;
    Ok(Cluster::assemble(record, sub_clusters, scheduler, ignore_readiness_check))
}

pub(crate) async fn all_bfe_clusters(tx: &mut dyn StoreTx) -> Result<Vec<BfeCluster>> {
    tx.fetch_bfe_clusters(&BfeClusterFilter::default()).await
}

/// Names of every known BFE cluster, i.e. the row keys every LB matrix must have
pub(crate) async fn bfe_cluster_names(tx: &mut dyn StoreTx) -> Result<Vec<String>> {
    Ok(all_bfe_clusters(tx).await?.into_iter().map(|b| b.name).collect())
}
