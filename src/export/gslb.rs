//! `gslb.<bfe cluster>` topics: one BFE cluster's row of every LB matrix

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{LbRow, Versioned};
use crate::errors::{Result, SwitchyardError};
use crate::services::Exporter;
use crate::storage::{BfeClusterFilter, ClusterFilter, StoreTx};

pub const GSLB_TOPIC_PREFIX: &str = "gslb.";

pub fn gslb_topic(bfe_cluster: &str) -> String {
    format!("{}{}", GSLB_TOPIC_PREFIX, bfe_cluster)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GslbFile {
    /// Cluster to sub-cluster percentages
    pub clusters: BTreeMap<String, LbRow>,
    pub hostname: String,
    /// The version, under the name the data plane expects
    pub ts: String,
}

impl Versioned for GslbFile {
    fn version(&self) -> &str {
        &self.ts
    }

    fn set_version(&mut self, version: String) {
        self.ts = version;
    }
}

#[derive(Debug)]
pub struct GslbExporter {
    bfe_cluster: String,
}

impl GslbExporter {
    pub fn new(bfe_cluster: impl Into<String>) -> Self {
        Self { bfe_cluster: bfe_cluster.into() }
    }
}

#[async_trait]
impl Exporter for GslbExporter {
    type Payload = GslbFile;

    fn topic(&self) -> String {
        gslb_topic(&self.bfe_cluster)
    }

    async fn generate(&self, tx: &mut dyn StoreTx) -> Result<GslbFile> {
        let known = tx.fetch_bfe_clusters(&BfeClusterFilter::by_name(&self.bfe_cluster)).await?;
        if known.is_empty() {
            return Err(SwitchyardError::not_exist("BfeCluster", &self.bfe_cluster));
        }

        let mut clusters = BTreeMap::new();
        for cluster in tx.fetch_clusters(&ClusterFilter::default()).await? {
            let row = tx
                .fetch_lb_matrix(cluster.id)
                .await?
                .and_then(|matrix| matrix.row(&self.bfe_cluster).cloned())
                .ok_or_else(|| {
                    SwitchyardError::dirty(format!(
                        "LB matrix of cluster '{}' has no row for BFE cluster '{}'",
                        cluster.name, self.bfe_cluster
                    ))
                })?;
            clusters.insert(cluster.name, row);
        }

        Ok(GslbFile { clusters, hostname: self.bfe_cluster.clone(), ts: String::new() })
    }
}
