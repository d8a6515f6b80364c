//! `cluster_table` topic: backend policies of every cluster

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{ClusterRecord, StickyType};
use crate::errors::Result;
use crate::services::Exporter;
use crate::storage::{ClusterFilter, StoreTx};

pub const CLUSTER_TABLE_TOPIC: &str = "cluster_table";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterTableFile {
    pub version: String,
    pub config: BTreeMap<String, ClusterConf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterConf {
    pub backend_conf: BackendConf,
    pub check_conf: CheckConf,
    pub gslb_basic: GslbBasicConf,
    pub cluster_basic: ClusterBasicConf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackendConf {
    pub timeout_conn_srv: i32,
    pub timeout_response_header: i32,
    pub max_idle_conns_per_host: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckConf {
    /// Spelled the way the data plane reads it
    pub schem: String,
    pub uri: String,
    pub host: String,
    pub status_code: i32,
    pub fail_num: i32,
    pub check_interval: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GslbBasicConf {
    pub cross_retry: i32,
    pub retry_max: i32,
    pub hash_conf: HashConf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HashConf {
    pub hash_strategy: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_header: Option<String>,
    pub session_sticky: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterBasicConf {
    pub timeout_read_client: i32,
    pub timeout_write_client: i32,
    pub timeout_read_client_again: i32,
    pub req_write_buffer_size: i32,
    pub req_flush_interval: i32,
    pub res_flush_interval: i32,
    pub cancel_on_client_close: bool,
}

impl_versioned!(ClusterTableFile);

impl From<&ClusterRecord> for ClusterConf {
    fn from(cluster: &ClusterRecord) -> Self {
        let basic = &cluster.basic;
        let health = &cluster.passive_health_check;
        let sticky = &cluster.sticky_sessions;

        Self {
            backend_conf: BackendConf {
                timeout_conn_srv: basic.timeouts.conn_backend,
                timeout_response_header: basic.timeouts.response_header,
                max_idle_conns_per_host: basic.connection.max_idle_conn_per_host,
            },
            check_conf: CheckConf {
                schem: health.schema.as_str().to_string(),
                uri: health.uri.clone(),
                host: health.host.clone(),
                status_code: health.statuscode,
                fail_num: health.failnum,
                check_interval: health.interval,
            },
            gslb_basic: GslbBasicConf {
                cross_retry: basic.retries.max_retry_cross_subcluster,
                retry_max: basic.retries.max_retry_in_subcluster,
                hash_conf: HashConf {
                    hash_strategy: sticky.hash_strategy.code(),
                    hash_header: sticky
                        .hash_header
                        .clone()
                        .filter(|_| sticky.hash_strategy.uses_header()),
                    session_sticky: sticky.sticky_type == StickyType::Instance,
                },
            },
            cluster_basic: ClusterBasicConf {
                timeout_read_client: basic.timeouts.read_client,
                timeout_write_client: basic.timeouts.write_client,
                timeout_read_client_again: basic.timeouts.read_client_again,
                req_write_buffer_size: basic.buffers.req_write_buffer_size,
                req_flush_interval: basic.buffers.req_flush_interval,
                res_flush_interval: basic.buffers.res_flush_interval,
                cancel_on_client_close: basic.connection.cancel_on_client_close,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct ClusterTableExporter;

#[async_trait]
impl Exporter for ClusterTableExporter {
    type Payload = ClusterTableFile;

    fn topic(&self) -> String {
        CLUSTER_TABLE_TOPIC.to_string()
    }

    async fn generate(&self, tx: &mut dyn StoreTx) -> Result<ClusterTableFile> {
        let config = tx
            .fetch_clusters(&ClusterFilter::default())
            .await?
            .iter()
            .map(|cluster| (cluster.name.clone(), ClusterConf::from(cluster)))
            .collect();
        Ok(ClusterTableFile { version: String::new(), config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClusterId, HashStrategy, ProductId, StickySessions};

    fn record(sticky_sessions: StickySessions) -> ClusterRecord {
        ClusterRecord {
            id: ClusterId::new(1),
            name: "web".to_string(),
            product_id: ProductId::new(2),
            description: String::new(),
            basic: Default::default(),
            sticky_sessions,
            passive_health_check: Default::default(),
        }
    }

    #[test]
    fn test_policy_mapping() {
        let conf = ClusterConf::from(&record(StickySessions::default()));
        assert_eq!(conf.gslb_basic.retry_max, 2);
        assert_eq!(conf.gslb_basic.hash_conf.hash_strategy, 1);
        assert_eq!(conf.gslb_basic.hash_conf.hash_header, None);
        assert!(!conf.gslb_basic.hash_conf.session_sticky);
        assert_eq!(conf.check_conf.schem, "http");
        assert_eq!(conf.check_conf.uri, "/health_check");

        let json = serde_json::to_value(&conf).unwrap();
        assert!(json["BackendConf"]["TimeoutConnSrv"].is_number());
        assert!(json["ClusterBasic"]["CancelOnClientClose"].is_boolean());
    }

    #[test]
    fn test_header_hashing() {
        let sticky = StickySessions {
            sticky_type: StickyType::Instance,
            hash_strategy: HashStrategy::ClientIdPreferred,
            hash_header: Some("X-Uid".to_string()),
        };
        let conf = ClusterConf::from(&record(sticky));
        assert_eq!(conf.gslb_basic.hash_conf.hash_strategy, 2);
        assert_eq!(conf.gslb_basic.hash_conf.hash_header.as_deref(), Some("X-Uid"));
        assert!(conf.gslb_basic.hash_conf.session_sticky);
    }
}
