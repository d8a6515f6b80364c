//! Sub-cluster business logic service

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::lookup::{require_pool, require_product, require_sub_cluster, resolve_sub_clusters};
use super::validation::validate_sub_cluster_name;
use crate::domain::pool::POOL_NAME_SEPARATOR;
use crate::domain::{Pool, Product, SubCluster};
use crate::errors::{Result, SwitchyardError};
use crate::storage::{NewSubCluster, Store, StoreTx, SubClusterFilter, SubClusterUpdate};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSubClusterRequest {
    #[validate(custom(function = "validate_sub_cluster_name"))]
    pub name: String,
    /// Bare names resolve inside the product's own namespace
    #[validate(length(min = 1))]
    pub pool_name: String,
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateSubClusterRequest {
    #[validate(length(min = 1))]
    pub pool_name: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
}

/// Service for managing sub-clusters, the pool bindings mounted into clusters
pub struct SubClusterService {
    store: Arc<dyn Store>,
}

impl SubClusterService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(
        skip(self, request),
        fields(sub_cluster = %request.name),
        name = "create_sub_cluster"
    )]
    pub async fn create_sub_cluster(
        &self,
        product_name: &str,
        request: CreateSubClusterRequest,
    ) -> Result<SubCluster> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;

        let duplicate = tx
            .fetch_sub_clusters(&SubClusterFilter {
                product_id: Some(product.id),
                names: Some(vec![request.name.clone()]),
                ..Default::default()
            })
            .await?;
        if !duplicate.is_empty() {
            return Err(SwitchyardError::existed("SubCluster", &request.name));
        }

        let pool = require_bindable_pool(&mut *tx, &product, &request.pool_name).await?;
        let record = tx
            .create_sub_cluster(&NewSubCluster {
                name: request.name,
                product_id: product.id,
                description: request.description,
                pool_id: pool.id,
            })
            .await?;
        tx.commit().await?;

        info!(
            sub_cluster_id = %record.id,
            sub_cluster = %record.name,
            pool = %pool.name,
            "Sub cluster created"
        );
        Ok(SubCluster::from_record(record, pool))
    }

    #[instrument(skip(self, request), name = "update_sub_cluster")]
    pub async fn update_sub_cluster(
        &self,
        product_name: &str,
        name: &str,
        request: UpdateSubClusterRequest,
    ) -> Result<SubCluster> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let record = require_sub_cluster(&mut *tx, &product, name).await?;

        let mut update = SubClusterUpdate { pool_id: None, description: request.description };
        if let Some(pool_name) = &request.pool_name {
            let pool = require_bindable_pool(&mut *tx, &product, pool_name).await?;
            if pool.id != record.pool_id {
                if let Some(cluster_id) = record.cluster_id {
                    return Err(SwitchyardError::model(format!(
                        "Sub cluster '{}' is mounted to cluster {}; unbind it before changing its pool",
                        record.name, cluster_id
                    )));
                }
                update.pool_id = Some(pool.id);
            }
        }

        tx.update_sub_cluster(record.id, &update).await?;
        let updated = require_sub_cluster(&mut *tx, &product, name).await?;
        let sub_cluster = resolve_sub_clusters(&mut *tx, vec![updated]).await?.remove(0);
        tx.commit().await?;

        info!(
            sub_cluster_id = %sub_cluster.id,
            pool = %sub_cluster.pool.name,
            "Sub cluster updated"
        );
        Ok(sub_cluster)
    }

    #[instrument(skip(self), name = "delete_sub_cluster")]
    pub async fn delete_sub_cluster(&self, product_name: &str, name: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let record = require_sub_cluster(&mut *tx, &product, name).await?;

        if let Some(cluster_id) = record.cluster_id {
            return Err(SwitchyardError::model(format!(
                "Sub cluster '{}' is mounted to cluster {} and cannot be deleted",
                record.name, cluster_id
            )));
        }

        tx.delete_sub_cluster(record.id).await?;
        tx.commit().await?;

        info!(sub_cluster_id = %record.id, sub_cluster = %record.name, "Sub cluster deleted");
        Ok(())
    }

    pub async fn fetch_sub_cluster(&self, product_name: &str, name: &str) -> Result<SubCluster> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let record = require_sub_cluster(&mut *tx, &product, name).await?;
        Ok(resolve_sub_clusters(&mut *tx, vec![record]).await?.remove(0))
    }

    pub async fn fetch_sub_clusters(&self, product_name: &str) -> Result<Vec<SubCluster>> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let records = tx.fetch_sub_clusters(&SubClusterFilter::by_product(product.id)).await?;
        resolve_sub_clusters(&mut *tx, records).await
    }
}

/// A sub-cluster may bind its own product's pools or any infrastructure pool
async fn require_bindable_pool(
    tx: &mut dyn StoreTx,
    product: &Product,
    pool_name: &str,
) -> Result<Pool> {
    let name = if pool_name.contains(POOL_NAME_SEPARATOR) {
        pool_name.to_string()
    } else {
        format!("{}{}{}", product.name, POOL_NAME_SEPARATOR, pool_name)
    };

    let pool = require_pool(tx, &name).await?;
    if pool.product_id != product.id && !pool.is_infrastructure() {
        return Err(SwitchyardError::param_field(
            format!("Pool '{}' belongs to another product", pool.name),
            "pool_name",
        ));
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClusterId, PoolTag, PoolType, BLACKHOLE, BUILTIN_PRODUCT_ID};
    use crate::errors::ErrorKind;
    use crate::storage::{MemoryStore, NewPool, NewProduct};

    async fn setup() -> (Arc<dyn Store>, SubClusterService) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut tx = store.begin().await.unwrap();
        let mut products = Vec::new();
        for name in ["shop", "blog"] {
            products.push(
                tx.create_product(&NewProduct {
                    name: name.to_string(),
                    description: String::new(),
                    mail_list: vec![],
                    contact: vec![],
                })
                .await
                .unwrap(),
            );
        }
        let pools = [
            ("shop.web", products[0].id, PoolTag::Product),
            ("shop.api", products[0].id, PoolTag::Product),
            ("blog.web", products[1].id, PoolTag::Product),
            ("BFE.shared", BUILTIN_PRODUCT_ID, PoolTag::Bfe),
        ];
        for (name, product_id, tag) in pools {
            tx.create_pool(&NewPool {
                name: name.to_string(),
                product_id,
                tag,
                pool_type: PoolType::Static,
                instances: vec![],
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        (store.clone(), SubClusterService::new(store))
    }

    fn request(name: &str, pool_name: &str) -> CreateSubClusterRequest {
        CreateSubClusterRequest {
            name: name.to_string(),
            pool_name: pool_name.to_string(),
            description: String::new(),
        }
    }

    async fn mount(store: &Arc<dyn Store>, sub_cluster: &SubCluster) {
        let mut tx = store.begin().await.unwrap();
        tx.bind_sub_clusters(ClusterId::new(99), &[sub_cluster.id]).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_binds_pool() {
        let (_, service) = setup().await;
        let sub = service.create_sub_cluster("shop", request("s1", "web")).await.unwrap();
        assert_eq!(sub.pool.name, "shop.web");
        assert!(!sub.is_mounted());
        assert!(sub.ready());

        let shared = service.create_sub_cluster("shop", request("s2", "BFE.shared")).await.unwrap();
        assert!(shared.pool.is_infrastructure());
    }

    #[tokio::test]
    async fn test_create_failures() {
        let (_, service) = setup().await;
        service.create_sub_cluster("shop", request("s1", "shop.web")).await.unwrap();

        let err = service.create_sub_cluster("shop", request("s1", "shop.api")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordExisted);

        let err = service
            .create_sub_cluster("shop", request("s2", "shop.missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordNotExist);

        let err = service.create_sub_cluster("shop", request("s2", "blog.web")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamIllegal);

        // Names are scoped per product
        service.create_sub_cluster("blog", request("s1", "web")).await.unwrap();
    }

    #[tokio::test]
    async fn test_blackhole_name_is_reserved() {
        let (_, service) = setup().await;

        let err = service.create_sub_cluster("shop", request(BLACKHOLE, "web")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamIllegal);
        assert!(service.fetch_sub_clusters("shop").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mounted_sub_cluster_is_pinned() {
        let (store, service) = setup().await;
        let sub = service.create_sub_cluster("shop", request("s1", "web")).await.unwrap();
        mount(&store, &sub).await;

        let err = service.delete_sub_cluster("shop", "s1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelViolation);

        let err = service
            .update_sub_cluster(
                "shop",
                "s1",
                UpdateSubClusterRequest { pool_name: Some("api".to_string()), description: None },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelViolation);

        let updated = service
            .update_sub_cluster(
                "shop",
                "s1",
                UpdateSubClusterRequest {
                    pool_name: None,
                    description: Some("primary".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description, "primary");
        assert!(updated.is_mounted());
    }

    #[tokio::test]
    async fn test_rebind_pool_and_delete_unmounted() {
        let (_, service) = setup().await;
        service.create_sub_cluster("shop", request("s1", "web")).await.unwrap();

        let updated = service
            .update_sub_cluster(
                "shop",
                "s1",
                UpdateSubClusterRequest {
                    pool_name: Some("shop.api".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.pool.name, "shop.api");

        service.delete_sub_cluster("shop", "s1").await.unwrap();
        assert!(service.fetch_sub_clusters("shop").await.unwrap().is_empty());
    }
}
