//! `instance_table` topic: backend instances of every mounted sub-cluster

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Instance, SubCluster};
use crate::errors::{Result, SwitchyardError};
use crate::services::lookup::resolve_sub_clusters;
use crate::services::Exporter;
use crate::storage::{ClusterFilter, StoreTx, SubClusterFilter};

pub const INSTANCE_TABLE_TOPIC: &str = "instance_table";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceTableFile {
    pub version: String,
    /// Cluster to sub-cluster to instances
    pub config: BTreeMap<String, BTreeMap<String, Vec<InstanceConf>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceConf {
    pub name: String,
    pub addr: String,
    pub port: u16,
    pub weight: i32,
}

impl_versioned!(InstanceTableFile);

impl InstanceConf {
    fn from_instance(sub_cluster: &SubCluster, instance: &Instance) -> Result<Self> {
        let port = instance.default_port().ok_or_else(|| {
            SwitchyardError::dirty(format!(
                "Instance '{}' of pool '{}' has no port",
                instance.hostname, sub_cluster.pool.name
            ))
        })?;
        Ok(Self {
            name: instance.hostname.clone(),
            addr: instance.ip.clone(),
            port,
            weight: instance.weight,
        })
    }
}

#[derive(Debug, Default)]
pub struct InstanceTableExporter;

#[async_trait]
impl Exporter for InstanceTableExporter {
    type Payload = InstanceTableFile;

    fn topic(&self) -> String {
        INSTANCE_TABLE_TOPIC.to_string()
    }

    async fn generate(&self, tx: &mut dyn StoreTx) -> Result<InstanceTableFile> {
        let mut config = BTreeMap::new();

        for cluster in tx.fetch_clusters(&ClusterFilter::default()).await? {
            let records = tx.fetch_sub_clusters(&SubClusterFilter::by_cluster(cluster.id)).await?;

            let mut sub_clusters = BTreeMap::new();
            for sub_cluster in resolve_sub_clusters(tx, records).await? {
                let instances = sub_cluster
                    .pool
                    .instances
                    .iter()
                    .map(|instance| InstanceConf::from_instance(&sub_cluster, instance))
                    .collect::<Result<Vec<_>>>()?;
                sub_clusters.insert(sub_cluster.name.clone(), instances);
            }
            config.insert(cluster.name, sub_clusters);
        }

        Ok(InstanceTableFile { version: String::new(), config })
    }
}
