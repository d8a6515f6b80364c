//! # Configuration export
//!
//! One exporter per data-plane file. Exporters only read; [`ExportService`]
//! runs them through version control and hides payloads the caller already
//! has.
//!
//! | Topic | Payload |
//! |-------|---------|
//! | `route_rule` | [`RouteTableFile`] |
//! | `host_table` | [`HostTableFile`] |
//! | `cluster_table` | [`ClusterTableFile`] |
//! | `instance_table` | [`InstanceTableFile`] |
//! | `gslb.<bfe cluster>` | [`GslbFile`] |
//! | `certificate` | [`ServerCertFile`] |

/// Implement [`Versioned`](crate::domain::Versioned) for a payload with a
/// `version: String` field
macro_rules! impl_versioned {
    ($payload:ty) => {
        impl $crate::domain::Versioned for $payload {
            fn version(&self) -> &str {
                &self.version
            }

            fn set_version(&mut self, version: String) {
                self.version = version;
            }
        }
    };
}

pub mod cluster_table;
pub mod gslb;
pub mod host_table;
pub mod instance_table;
pub mod route_table;
pub mod server_cert;

pub use cluster_table::{ClusterTableExporter, ClusterTableFile, CLUSTER_TABLE_TOPIC};
pub use gslb::{gslb_topic, GslbExporter, GslbFile, GSLB_TOPIC_PREFIX};
pub use host_table::{HostTableExporter, HostTableFile, HOST_TABLE_TOPIC};
pub use instance_table::{InstanceTableExporter, InstanceTableFile, INSTANCE_TABLE_TOPIC};
pub use route_table::{RouteTableExporter, RouteTableFile, ROUTE_RULE_TOPIC};
pub use server_cert::{
    CertFiles, ServerCertConf, ServerCertExporter, ServerCertFile, CERTIFICATE_TOPIC,
};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{ProductId, Versioned};
use crate::errors::{Result, SwitchyardError};
use crate::services::{Exporter, VersionControlService};
use crate::storage::{ProductFilter, Store, StoreTx};

/// Every fixed topic; GSLB topics are per BFE cluster
pub const FIXED_TOPICS: [&str; 5] = [
    ROUTE_RULE_TOPIC,
    HOST_TABLE_TOPIC,
    CLUSTER_TABLE_TOPIC,
    INSTANCE_TABLE_TOPIC,
    CERTIFICATE_TOPIC,
];

/// Product id to name
pub(crate) async fn product_names(tx: &mut dyn StoreTx) -> Result<BTreeMap<ProductId, String>> {
    let products = tx.fetch_products(&ProductFilter::default()).await?;
    Ok(products.into_iter().map(|p| (p.id, p.name)).collect())
}

/// Versioned exports for data-plane consumers
pub struct ExportService {
    version_control: VersionControlService,
    default_product: Option<String>,
}

impl ExportService {
    pub fn new(store: Arc<dyn Store>, default_product: Option<String>) -> Self {
        Self { version_control: VersionControlService::new(store), default_product }
    }

    pub async fn export_route_rule(
        &self,
        last_version: Option<&str>,
    ) -> Result<Option<RouteTableFile>> {
        self.export_if_changed(&RouteTableExporter, last_version).await
    }

    pub async fn export_host_table(
        &self,
        last_version: Option<&str>,
    ) -> Result<Option<HostTableFile>> {
        self.export_if_changed(
            &HostTableExporter::new(self.default_product.clone()),
            last_version,
        )
        .await
    }

    pub async fn export_cluster_table(
        &self,
        last_version: Option<&str>,
    ) -> Result<Option<ClusterTableFile>> {
        self.export_if_changed(&ClusterTableExporter, last_version).await
    }

    pub async fn export_instance_table(
        &self,
        last_version: Option<&str>,
    ) -> Result<Option<InstanceTableFile>> {
        self.export_if_changed(&InstanceTableExporter, last_version).await
    }

    pub async fn export_gslb(
        &self,
        bfe_cluster: &str,
        last_version: Option<&str>,
    ) -> Result<Option<GslbFile>> {
        self.export_if_changed(&GslbExporter::new(bfe_cluster), last_version).await
    }

    pub async fn export_server_cert(
        &self,
        last_version: Option<&str>,
    ) -> Result<Option<ServerCertFile>> {
        self.export_if_changed(&ServerCertExporter, last_version).await
    }

    /// Export a topic by name as JSON
    pub async fn export_topic(
        &self,
        topic: &str,
        last_version: Option<&str>,
    ) -> Result<Option<serde_json::Value>> {
        match topic {
            ROUTE_RULE_TOPIC => to_json(self.export_route_rule(last_version).await?),
            HOST_TABLE_TOPIC => to_json(self.export_host_table(last_version).await?),
            CLUSTER_TABLE_TOPIC => to_json(self.export_cluster_table(last_version).await?),
            INSTANCE_TABLE_TOPIC => to_json(self.export_instance_table(last_version).await?),
            CERTIFICATE_TOPIC => to_json(self.export_server_cert(last_version).await?),
            _ => match topic.strip_prefix(GSLB_TOPIC_PREFIX) {
                Some(bfe_cluster) if !bfe_cluster.is_empty() => {
                    to_json(self.export_gslb(bfe_cluster, last_version).await?)
                }
                _ => Err(SwitchyardError::param_field(
                    format!(
                        "Unknown export topic '{}'; expected one of {} or {}<bfe cluster>",
                        topic,
                        FIXED_TOPICS.join(", "),
                        GSLB_TOPIC_PREFIX
                    ),
                    "topic",
                )),
            },
        }
    }

    pub fn version_control(&self) -> &VersionControlService {
        &self.version_control
    }

    async fn export_if_changed<E: Exporter>(
        &self,
        exporter: &E,
        last_version: Option<&str>,
    ) -> Result<Option<E::Payload>> {
        let payload = self.version_control.export_config(exporter).await?;
        if last_version == Some(payload.version()) {
            debug!(
                topic = %exporter.topic(),
                version = %payload.version(),
                "Caller already has this version"
            );
            return Ok(None);
        }
        Ok(Some(payload))
    }
}

fn to_json<T: Serialize>(payload: Option<T>) -> Result<Option<serde_json::Value>> {
    payload
        .map(|p| {
            serde_json::to_value(p).map_err(|e| SwitchyardError::Serialization {
                source: e,
                context: "Failed to serialize export payload".to_string(),
            })
        })
        .transpose()
}
