//! Sub-cluster domain types
//!
//! A sub-cluster binds exactly one pool into (at most) one service cluster and
//! is the unit of traffic allocation in the LB matrix.

use super::id::{ClusterId, PoolId, ProductId, SubClusterId};
use super::pool::Pool;
use serde::{Deserialize, Serialize};

/// Sub-cluster row as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubClusterRecord {
    pub id: SubClusterId,
    pub name: String,
    pub product_id: ProductId,
    pub description: String,
    pub pool_id: PoolId,
    pub cluster_id: Option<ClusterId>,
}

/// Sub-cluster with its pool resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCluster {
    pub id: SubClusterId,
    pub name: String,
    pub product_id: ProductId,
    pub description: String,
    pub cluster_id: Option<ClusterId>,
    pub pool: Pool,
}

impl SubCluster {
    pub fn from_record(record: SubClusterRecord, pool: Pool) -> Self {
        Self {
            id: record.id,
            name: record.name,
            product_id: record.product_id,
            description: record.description,
            cluster_id: record.cluster_id,
            pool,
        }
    }

    /// Mounted sub-clusters belong to a cluster and cannot be deleted or
    /// re-pointed at another pool.
    pub fn is_mounted(&self) -> bool {
        self.cluster_id.is_some()
    }

    pub fn ready(&self) -> bool {
        self.pool.ready()
    }
}
