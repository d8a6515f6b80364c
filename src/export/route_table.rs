//! `route_rule` topic: per-product basic and advanced rules

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::product_names;
use crate::domain::{is_reserved_cluster_name, ProductRouteRule, ADVANCED_MODE_CLUSTER};
use crate::errors::{Result, SwitchyardError};
use crate::services::Exporter;
use crate::storage::StoreTx;

pub const ROUTE_RULE_TOPIC: &str = "route_rule";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTableFile {
    pub version: String,
    pub basic_rule: BTreeMap<String, Vec<BasicRuleFile>>,
    pub product_rule: BTreeMap<String, Vec<AdvancedRuleFile>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BasicRuleFile {
    pub hostname: Vec<String>,
    pub path: Vec<String>,
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdvancedRuleFile {
    pub cond: String,
    pub cluster_name: String,
}

impl_versioned!(RouteTableFile);

#[derive(Debug, Default)]
pub struct RouteTableExporter;

#[async_trait]
impl Exporter for RouteTableExporter {
    type Payload = RouteTableFile;

    fn topic(&self) -> String {
        ROUTE_RULE_TOPIC.to_string()
    }

    async fn generate(&self, tx: &mut dyn StoreTx) -> Result<RouteTableFile> {
        let names = product_names(tx).await?;
        let mut file = RouteTableFile {
            version: String::new(),
            basic_rule: BTreeMap::new(),
            product_rule: BTreeMap::new(),
        };

        for (product_id, rules) in tx.fetch_route_rules(None).await? {
            let product = names
                .get(&product_id)
                .ok_or_else(|| {
                    SwitchyardError::dirty(format!(
                        "Route rules reference missing product {}",
                        product_id
                    ))
                })?;
            let (basic, advanced) = convert(rules);
            file.basic_rule.insert(product.clone(), basic);
            file.product_rule.insert(product.clone(), advanced);
        }

        Ok(file)
    }
}

fn convert(rules: ProductRouteRule) -> (Vec<BasicRuleFile>, Vec<AdvancedRuleFile>) {
    let basic = rules
        .basic_rules
        .into_iter()
        .map(|rule| BasicRuleFile {
            hostname: rule.host_names,
            path: rule.paths,
            // Both reserved aliases mean "continue with the advanced rules"
            cluster_name: if is_reserved_cluster_name(&rule.cluster_name) {
                ADVANCED_MODE_CLUSTER.to_string()
            } else {
                rule.cluster_name
            },
        })
        .collect();

    let advanced = rules
        .advanced_rules
        .into_iter()
        .map(|rule| AdvancedRuleFile { cond: rule.expression, cluster_name: rule.cluster_name })
        .collect();

    (basic, advanced)
}
