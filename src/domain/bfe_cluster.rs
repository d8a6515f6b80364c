//! Load balancer fleet deployment units

use super::id::{BfeClusterId, PoolId};
use serde::{Deserialize, Serialize};

/// A deployment unit of the load balancer fleet. Each one is a row key of
/// every service cluster's LB matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfeCluster {
    pub id: BfeClusterId,
    pub name: String,
    /// Infrastructure pool holding the fleet's own instances
    pub pool_id: PoolId,
    /// Queries per second the unit is provisioned for
    pub capacity: i64,
    pub enabled: bool,
}
