//! Pool business logic service
//!
//! Pools are named `<product>.<suffix>`. Pools of the built-in product are
//! infrastructure pools, tagged `bfe`; every other pool is tagged `product`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::lookup::{require_pool, require_product};
use crate::domain::pool::qualify_pool_name;
use crate::domain::{Instance, Pool, PoolTag, PoolType, Product};
use crate::errors::{Result, SwitchyardError};
use crate::storage::{BfeClusterFilter, NewPool, PoolFilter, Store, StoreTx, SubClusterFilter};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePoolRequest {
    /// Bare suffix or the fully qualified `<product>.<suffix>` name
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub pool_type: PoolType,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

/// Service for managing instance pools
pub struct PoolService {
    store: Arc<dyn Store>,
}

impl PoolService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, request), fields(pool = %request.name), name = "create_pool")]
    pub async fn create_pool(
        &self,
        product_name: &str,
        request: CreatePoolRequest,
    ) -> Result<Pool> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let name = qualify_pool_name(&product.name, &request.name)?;
        validate_instances(&request.instances)?;

        if !tx.fetch_pools(&PoolFilter::by_name(&name)).await?.is_empty() {
            return Err(SwitchyardError::existed("Pool", name));
        }

        let tag = if product.is_builtin() { PoolTag::Bfe } else { PoolTag::Product };
        let pool = tx
            .create_pool(&NewPool {
                name,
                product_id: product.id,
                tag,
                pool_type: request.pool_type,
                instances: request.instances,
            })
            .await?;
        tx.commit().await?;

        info!(pool_id = %pool.id, pool = %pool.name, tag = pool.tag.as_str(), "Pool created");
        Ok(pool)
    }

    /// Replace the instance list of a pool
    #[instrument(
        skip(self, instances),
        fields(instance_count = instances.len()),
        name = "update_pool_instances"
    )]
    pub async fn update_pool_instances(
        &self,
        product_name: &str,
        pool_name: &str,
        instances: Vec<Instance>,
    ) -> Result<Pool> {
        validate_instances(&instances)?;

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let mut pool = require_owned_pool(&mut *tx, &product, pool_name).await?;

        tx.update_pool_instances(pool.id, &instances).await?;
        tx.commit().await?;

        pool.instances = instances;
        info!(
            pool_id = %pool.id,
            pool = %pool.name,
            ready = pool.ready(),
            "Pool instances updated"
        );
        Ok(pool)
    }

    #[instrument(skip(self), name = "delete_pool")]
    pub async fn delete_pool(&self, product_name: &str, pool_name: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let pool = require_owned_pool(&mut *tx, &product, pool_name).await?;

        let references = pool_references(&mut *tx, &pool).await?;
        if !references.is_empty() {
            return Err(SwitchyardError::model(format!(
                "Pool '{}' is still referenced by {}",
                pool.name,
                references.join(", ")
            )));
        }

        tx.delete_pool(pool.id).await?;
        tx.commit().await?;

        info!(pool_id = %pool.id, pool = %pool.name, "Pool deleted");
        Ok(())
    }

    /// Whether nothing references the pool any more
    pub async fn pool_deletable(&self, product_name: &str, pool_name: &str) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let pool = require_owned_pool(&mut *tx, &product, pool_name).await?;
        Ok(pool_references(&mut *tx, &pool).await?.is_empty())
    }

    pub async fn fetch_pool(&self, product_name: &str, pool_name: &str) -> Result<Pool> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        require_owned_pool(&mut *tx, &product, pool_name).await
    }

    pub async fn fetch_pools(&self, product_name: &str) -> Result<Vec<Pool>> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        tx.fetch_pools(&PoolFilter::by_product(product.id)).await
    }
}

fn validate_instances(instances: &[Instance]) -> Result<()> {
    instances.iter().try_for_each(Instance::validate)
}

/// Resolve a bare or qualified pool name owned by `product`
async fn require_owned_pool(
    tx: &mut dyn StoreTx,
    product: &Product,
    pool_name: &str,
) -> Result<Pool> {
    let name = qualify_pool_name(&product.name, pool_name)?;
    let pool = require_pool(tx, &name).await?;
    if pool.product_id != product.id {
        return Err(SwitchyardError::not_exist("Pool", name));
    }
    Ok(pool)
}

/// Human-readable list of what still points at `pool`
async fn pool_references(tx: &mut dyn StoreTx, pool: &Pool) -> Result<Vec<String>> {
    let bfe_clusters = tx.fetch_bfe_clusters(&BfeClusterFilter::by_pool(pool.id)).await?;
    let sub_clusters = tx.fetch_sub_clusters(&SubClusterFilter::by_pool(pool.id)).await?;

    Ok(bfe_clusters
        .into_iter()
        .map(|b| format!("BFE cluster '{}'", b.name))
        .chain(sub_clusters.into_iter().map(|s| format!("sub cluster '{}'", s.name)))
        .collect())
}
