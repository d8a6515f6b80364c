//! `host_table` topic: hostname to product mapping
//!
//! Every product gets a single host tag named after itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::product_names;
use crate::errors::{Result, SwitchyardError};
use crate::services::Exporter;
use crate::storage::{DomainFilter, StoreTx};

pub const HOST_TABLE_TOPIC: &str = "host_table";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostTableFile {
    pub version: String,
    /// Product serving hosts that match no registered domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_product: Option<String>,
    /// Host tag to hostnames
    pub hosts: BTreeMap<String, Vec<String>>,
    /// Product to host tags
    pub host_tags: BTreeMap<String, Vec<String>>,
}

impl_versioned!(HostTableFile);

#[derive(Debug, Default)]
pub struct HostTableExporter {
    default_product: Option<String>,
}

impl HostTableExporter {
    pub fn new(default_product: Option<String>) -> Self {
        Self { default_product }
    }
}

#[async_trait]
impl Exporter for HostTableExporter {
    type Payload = HostTableFile;

    fn topic(&self) -> String {
        HOST_TABLE_TOPIC.to_string()
    }

    async fn generate(&self, tx: &mut dyn StoreTx) -> Result<HostTableFile> {
        let names = product_names(tx).await?;
        if let Some(default) = &self.default_product {
            if !names.values().any(|name| name == default) {
                return Err(SwitchyardError::not_exist("Product", default));
            }
        }

        let mut hosts: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for domain in tx.fetch_domains(&DomainFilter::default()).await? {
            let product = names.get(&domain.product_id).ok_or_else(|| {
                SwitchyardError::dirty(format!(
                    "Domain '{}' references missing product {}",
                    domain.name,
                    domain.product_id
                ))
            })?;
            hosts.entry(product.clone()).or_default().push(domain.name);
        }

        let host_tags = hosts
            .keys()
            .map(|product| (product.clone(), vec![product.clone()]))
            .collect();
        Ok(HostTableFile {
            version: String::new(),
            default_product: self.default_product.clone(),
            hosts,
            host_tags,
        })
    }
}
