//! BFE cluster business logic service
//!
//! Every LB matrix carries one row per BFE cluster, so adding or removing a
//! BFE cluster rewrites every stored matrix in the same unit of work.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::lookup::{all_bfe_clusters, require_pool};
use super::validation::validate_entity_name;
use crate::domain::{BfeCluster, LbMatrix};
use crate::errors::{Result, SwitchyardError};
use crate::storage::{
    BfeClusterFilter, ClusterFilter, NewBfeCluster, Store, StoreTx, SubClusterFilter,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBfeClusterRequest {
    #[validate(custom(function = "validate_entity_name"))]
    pub name: String,
    /// Fully qualified infrastructure pool name
    #[validate(length(min = 1))]
    pub pool_name: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub capacity: i64,
}

/// Service for managing the load balancer fleet's own deployment units
pub struct BfeClusterService {
    store: Arc<dyn Store>,
}

impl BfeClusterService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(
        skip(self, request),
        fields(bfe_cluster = %request.name),
        name = "create_bfe_cluster"
    )]
    pub async fn create_bfe_cluster(&self, request: CreateBfeClusterRequest) -> Result<BfeCluster> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let existing = tx.fetch_bfe_clusters(&BfeClusterFilter::by_name(&request.name)).await?;
        if !existing.is_empty() {
            return Err(SwitchyardError::existed("BfeCluster", &request.name));
        }

        let pool = require_pool(&mut *tx, &request.pool_name).await?;
        if !pool.is_infrastructure() {
            return Err(SwitchyardError::param_field(
                format!("Pool '{}' is not an infrastructure pool", pool.name),
                "pool_name",
            ));
        }

        let bfe_cluster = tx
            .create_bfe_cluster(&NewBfeCluster {
                name: request.name,
                pool_id: pool.id,
                capacity: request.capacity,
                enabled: true,
            })
            .await?;

        let extended = extend_matrices(&mut *tx, &bfe_cluster.name).await?;
        tx.commit().await?;

        info!(
            bfe_cluster_id = %bfe_cluster.id,
            bfe_cluster = %bfe_cluster.name,
            matrices_extended = extended,
            "BFE cluster created"
        );
        Ok(bfe_cluster)
    }

    #[instrument(skip(self), name = "delete_bfe_cluster")]
    pub async fn delete_bfe_cluster(&self, name: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let bfe_cluster = tx
            .fetch_bfe_clusters(&BfeClusterFilter::by_name(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SwitchyardError::not_exist("BfeCluster", name))?;

        let mut shrunk = 0usize;
        for cluster in tx.fetch_clusters(&ClusterFilter::default()).await? {
            let Some(mut matrix) = tx.fetch_lb_matrix(cluster.id).await? else {
                continue;
            };
            if matrix.remove_row(&bfe_cluster.name).is_some() {
                tx.upsert_lb_matrix(cluster.id, cluster.product_id, &matrix).await?;
                shrunk += 1;
            }
        }

        tx.delete_bfe_cluster(bfe_cluster.id).await?;
        tx.commit().await?;

        info!(bfe_cluster = %bfe_cluster.name, matrices_shrunk = shrunk, "BFE cluster deleted");
        Ok(())
    }

    pub async fn fetch_bfe_clusters(&self) -> Result<Vec<BfeCluster>> {
        let mut tx = self.store.begin().await?;
        all_bfe_clusters(&mut *tx).await
    }
}

/// Give every cluster's matrix a default row for a new BFE cluster
async fn extend_matrices(tx: &mut dyn StoreTx, bfe_cluster: &str) -> Result<usize> {
    let clusters = tx.fetch_clusters(&ClusterFilter::default()).await?;
    let count = clusters.len();

    for cluster in clusters {
        let sub_clusters: Vec<String> = tx
            .fetch_sub_clusters(&SubClusterFilter::by_cluster(cluster.id))
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();

        let mut matrix = tx.fetch_lb_matrix(cluster.id).await?.unwrap_or_else(LbMatrix::new);
        matrix.insert_row(bfe_cluster, LbMatrix::default_row(&sub_clusters));
        tx.upsert_lb_matrix(cluster.id, cluster.product_id, &matrix).await?;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PoolTag, PoolType, BLACKHOLE, BUILTIN_PRODUCT_ID};
    use crate::errors::ErrorKind;
    use crate::storage::{MemoryStore, NewPool};

    async fn setup() -> BfeClusterService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut tx = store.begin().await.unwrap();
        for (name, tag) in [("BFE.gz", PoolTag::Bfe), ("shop.web", PoolTag::Product)] {
            tx.create_pool(&NewPool {
                name: name.to_string(),
                product_id: BUILTIN_PRODUCT_ID,
                tag,
                pool_type: PoolType::Static,
                instances: vec![],
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        BfeClusterService::new(store)
    }

    fn request(name: &str, pool_name: &str) -> CreateBfeClusterRequest {
        CreateBfeClusterRequest {
            name: name.to_string(),
            pool_name: pool_name.to_string(),
            capacity: 1000,
        }
    }

    #[tokio::test]
    async fn test_create_requires_infrastructure_pool() {
        let service = setup().await;
        let err = service.create_bfe_cluster(request("bfe1", "shop.web")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamIllegal);

        let err = service.create_bfe_cluster(request("bfe1", "BFE.missing")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordNotExist);

        let created = service.create_bfe_cluster(request("bfe1", "BFE.gz")).await.unwrap();
        assert!(created.enabled);

        let err = service.create_bfe_cluster(request("bfe1", "BFE.gz")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordExisted);
    }

    #[tokio::test]
    async fn test_delete_and_fetch() {
        let service = setup().await;
        service.create_bfe_cluster(request("bfe1", "BFE.gz")).await.unwrap();
        service.create_bfe_cluster(request("bfe2", "BFE.gz")).await.unwrap();

        service.delete_bfe_cluster("bfe1").await.unwrap();
        let names: Vec<String> = service
            .fetch_bfe_clusters()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["bfe2".to_string()]);

        let err = service.delete_bfe_cluster("bfe1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordNotExist);
    }

    #[test]
    fn test_new_row_matches_default_split() {
        let row = LbMatrix::default_row(&["s1", "s2", "s3"]);
        assert_eq!(row.values().sum::<i32>(), 100);
        assert_eq!(row[BLACKHOLE], 1);
    }
}
