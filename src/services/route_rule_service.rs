//! Route rule business logic service
//!
//! A product's rules are always replaced as a whole. Shape checks run before
//! the unit of work starts; cluster and host resolution run inside it, after
//! the product's advanced rules are locked.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use super::cluster_service::ClusterDeleteChecker;
use super::lookup::{assemble_cluster, require_cluster, require_product};
use crate::domain::hostname::{is_valid_hostname, matches};
use crate::domain::{is_reserved_cluster_name, Cluster, ClusterId, Product, ProductRouteRule};
use crate::errors::{Result, SwitchyardError};
use crate::storage::{ClusterFilter, DomainFilter, Store, StoreTx};

/// Service for managing per-product route rules
pub struct RouteRuleService {
    store: Arc<dyn Store>,
    ignore_readiness_check: bool,
}

impl RouteRuleService {
    pub fn new(store: Arc<dyn Store>, ignore_readiness_check: bool) -> Self {
        Self { store, ignore_readiness_check }
    }

    /// Replace the product's complete rule set
    #[instrument(
        skip(self, rules),
        fields(basic = rules.basic_rules.len(), advanced = rules.advanced_rules.len()),
        name = "upsert_product_rule"
    )]
    pub async fn upsert_product_rule(
        &self,
        product_name: &str,
        mut rules: ProductRouteRule,
    ) -> Result<ProductRouteRule> {
        check_rule_shape(&rules)?;

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        tx.lock_advanced_rules(product.id).await?;

        let domains: Vec<String> = tx
            .fetch_domains(&DomainFilter::by_product(product.id))
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect();
        for (index, rule) in rules.basic_rules.iter().enumerate() {
            let foreign = rule.host_names.iter().find(|h| !domains.iter().any(|d| matches(d, h)));
            if let Some(host) = foreign {
                return Err(SwitchyardError::param_field(
                    format!("Host '{}' is not a domain of product '{}'", host, product.name),
                    format!("basic_rules[{}].host_names", index),
                ));
            }
        }

        let mut resolver = ClusterResolver::new(&product, self.ignore_readiness_check);
        for rule in rules.basic_rules.iter_mut() {
            rule.cluster_id = if is_reserved_cluster_name(&rule.cluster_name) {
                None
            } else {
                Some(resolver.resolve(&mut *tx, &rule.cluster_name).await?)
            };
        }
        for rule in rules.advanced_rules.iter_mut() {
            rule.cluster_id = Some(resolver.resolve(&mut *tx, &rule.cluster_name).await?);
        }

        tx.delete_route_rules(product.id).await?;
        tx.create_route_rules(product.id, &rules).await?;
        tx.commit().await?;

        info!(
            product = %product.name,
            basic = rules.basic_rules.len(),
            advanced = rules.advanced_rules.len(),
            "Route rules replaced"
        );
        Ok(rules)
    }

    pub async fn fetch_product_rule(&self, product_name: &str) -> Result<ProductRouteRule> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        Ok(tx.fetch_route_rules(Some(product.id)).await?.remove(&product.id).unwrap_or_default())
    }

    /// Whether any rule of the product routes to the cluster
    pub async fn cluster_referenced(&self, product_name: &str, cluster_name: &str) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let cluster = require_cluster(&mut *tx, &product, cluster_name).await?;
        cluster_in_rules(&mut *tx, &product, cluster.id).await
    }

    /// Whether any rule in the fleet matches on the hostname
    pub async fn domain_referenced(&self, hostname: &str) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        host_in_rules(&mut *tx, hostname).await
    }
}

/// Vetoes deleting a cluster that route rules still point at
#[derive(Debug, Default)]
pub struct RouteRuleClusterChecker;

#[async_trait]
impl ClusterDeleteChecker for RouteRuleClusterChecker {
    fn name(&self) -> &str {
        "route_rule"
    }

    async fn check(
        &self,
        tx: &mut dyn StoreTx,
        product: &Product,
        cluster: &Cluster,
    ) -> Result<Option<String>> {
        Ok(cluster_in_rules(tx, product, cluster.id)
            .await?
            .then(|| format!("still referenced by route rules of product '{}'", product.name)))
    }
}

pub(crate) async fn cluster_in_rules(
    tx: &mut dyn StoreTx,
    product: &Product,
    cluster_id: ClusterId,
) -> Result<bool> {
    Ok(tx
        .fetch_route_rules(Some(product.id))
        .await?
        .get(&product.id)
        .is_some_and(|rules| rules.references_cluster(cluster_id)))
}

pub(crate) async fn host_in_rules(tx: &mut dyn StoreTx, hostname: &str) -> Result<bool> {
    Ok(tx.fetch_route_rules(None).await?.values().any(|rules| rules.references_host(hostname)))
}

/// Checks that need no store access
fn check_rule_shape(rules: &ProductRouteRule) -> Result<()> {
    match rules.advanced_rules.last() {
        Some(last) if last.is_catch_all() => {}
        _ => {
            return Err(SwitchyardError::param_field(
                "The advanced rule list must end with the catch-all condition default_t()",
                "advanced_rules",
            ))
        }
    }

    for (index, rule) in rules.basic_rules.iter().enumerate() {
        let field = format!("basic_rules[{}]", index);
        if rule.host_names.is_empty() && rule.paths.is_empty() {
            return Err(SwitchyardError::param_field(
                "A basic rule needs at least one host or path",
                field,
            ));
        }
        if let Some(host) = rule.host_names.iter().find(|h| !is_valid_hostname(h)) {
            return Err(SwitchyardError::param_field(format!("Invalid host '{}'", host), field));
        }
        if let Some(path) = rule.paths.iter().find(|p| !p.starts_with('/')) {
            return Err(SwitchyardError::param_field(
                format!("Path '{}' must start with '/'", path),
                field,
            ));
        }
        if rule.cluster_name.is_empty() {
            return Err(SwitchyardError::param_field("Cluster name cannot be empty", field));
        }
    }

    for (index, rule) in rules.advanced_rules.iter().enumerate() {
        let field = format!("advanced_rules[{}]", index);
        if rule.name.trim().is_empty() || rule.expression.trim().is_empty() {
            return Err(SwitchyardError::param_field(
                "An advanced rule needs a name and an expression",
                field,
            ));
        }
        if is_reserved_cluster_name(&rule.cluster_name) {
            return Err(SwitchyardError::param_field(
                format!("Cluster '{}' may only be targeted by basic rules", rule.cluster_name),
                field,
            ));
        }
    }

    Ok(())
}

/// Resolves cluster names of one product, checking readiness once per name
struct ClusterResolver<'a> {
    product: &'a Product,
    ignore_readiness_check: bool,
    resolved: BTreeMap<String, ClusterId>,
}

impl<'a> ClusterResolver<'a> {
    fn new(product: &'a Product, ignore_readiness_check: bool) -> Self {
        Self { product, ignore_readiness_check, resolved: BTreeMap::new() }
    }

    async fn resolve(&mut self, tx: &mut dyn StoreTx, name: &str) -> Result<ClusterId> {
        if let Some(id) = self.resolved.get(name) {
            return Ok(*id);
        }

        let record = tx
            .fetch_clusters(&ClusterFilter {
                name: Some(name.to_string()),
                product_id: Some(self.product.id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SwitchyardError::not_exist("Cluster", name))?;
        let cluster = assemble_cluster(tx, record, self.ignore_readiness_check).await?;
        if !cluster.ready {
            return Err(SwitchyardError::unready(format!("Cluster '{}' is not ready", name)));
        }

        self.resolved.insert(name.to_string(), cluster.id);
        Ok(cluster.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdvancedRule, BasicRule, PoolTag, PoolType, DEFAULT_CONDITION};
    use crate::errors::ErrorKind;
    use crate::storage::{MemoryStore, NewCluster, NewDomain, NewPool, NewProduct, NewSubCluster};

    /// `shop` owns `*.shop.com` and `shop.com`, a ready cluster `web` and an
    /// unready cluster `cold`
    async fn setup() -> (Arc<dyn Store>, RouteRuleService) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut tx = store.begin().await.unwrap();
        let product = tx
            .create_product(&NewProduct {
                name: "shop".to_string(),
                description: String::new(),
                mail_list: vec![],
                contact: vec![],
            })
            .await
            .unwrap();
        for name in ["*.shop.com", "shop.com"] {
            tx.create_domain(&NewDomain {
                name: name.to_string(),
                product_id: product.id,
                using_advanced_redirect: false,
                using_advanced_hsts: false,
            })
            .await
            .unwrap();
        }

        for (cluster_name, pool_type) in [("web", PoolType::Static), ("cold", PoolType::Registry)] {
            let pool = tx
                .create_pool(&NewPool {
                    name: format!("shop.{}", cluster_name),
                    product_id: product.id,
                    tag: PoolTag::Product,
                    pool_type,
                    instances: vec![],
                })
                .await
                .unwrap();
            let sub = tx
                .create_sub_cluster(&NewSubCluster {
                    name: format!("{}-sub", cluster_name),
                    product_id: product.id,
                    description: String::new(),
                    pool_id: pool.id,
                })
                .await
                .unwrap();
            let cluster = tx
                .create_cluster(&NewCluster {
                    name: cluster_name.to_string(),
                    product_id: product.id,
                    description: String::new(),
                    basic: Default::default(),
                    sticky_sessions: Default::default(),
                    passive_health_check: Default::default(),
                })
                .await
                .unwrap();
            tx.bind_sub_clusters(cluster.id, &[sub.id]).await.unwrap();
            tx.upsert_lb_matrix(cluster.id, product.id, &Default::default()).await.unwrap();
        }
        tx.commit().await.unwrap();
        (store.clone(), RouteRuleService::new(store, false))
    }

    fn basic(hosts: &[&str], paths: &[&str], cluster: &str) -> BasicRule {
        BasicRule {
            host_names: hosts.iter().map(|s| s.to_string()).collect(),
            paths: paths.iter().map(|s| s.to_string()).collect(),
            cluster_name: cluster.to_string(),
            cluster_id: None,
            description: String::new(),
        }
    }

    fn advanced(name: &str, expression: &str, cluster: &str) -> AdvancedRule {
        AdvancedRule {
            name: name.to_string(),
            expression: expression.to_string(),
            cluster_name: cluster.to_string(),
            cluster_id: None,
            description: String::new(),
        }
    }

    fn valid_rules() -> ProductRouteRule {
        ProductRouteRule {
            basic_rules: vec![
                basic(&["www.shop.com"], &["/api"], "web"),
                basic(&["shop.com"], &[], "ADVANCED_MODE"),
            ],
            advanced_rules: vec![
                advanced("img", "req_host_in(\"img.shop.com\")", "web"),
                advanced("default", DEFAULT_CONDITION, "web"),
            ],
        }
    }

    #[tokio::test]
    async fn test_upsert_resolves_clusters() {
        let (_, service) = setup().await;
        let stored = service.upsert_product_rule("shop", valid_rules()).await.unwrap();

        assert!(stored.basic_rules[0].cluster_id.is_some());
        assert_eq!(stored.basic_rules[1].cluster_id, None);
        assert_eq!(service.fetch_product_rule("shop").await.unwrap(), stored);
        assert!(service.cluster_referenced("shop", "web").await.unwrap());
        assert!(service.domain_referenced("img.shop.com").await.unwrap());
        assert!(!service.domain_referenced("other.shop.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_catch_all_keeps_old_rules() {
        let (_, service) = setup().await;
        let stored = service.upsert_product_rule("shop", valid_rules()).await.unwrap();

        let mut broken = valid_rules();
        broken.advanced_rules.pop();
        let err = service.upsert_product_rule("shop", broken).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamIllegal);
        assert_eq!(service.fetch_product_rule("shop").await.unwrap(), stored);

        let empty = ProductRouteRule { advanced_rules: vec![], ..valid_rules() };
        let err = service.upsert_product_rule("shop", empty).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamIllegal);
    }

    #[tokio::test]
    async fn test_rule_rejections() {
        let (_, service) = setup().await;
        let cases = [
            (basic(&[], &[], "web"), ErrorKind::ParamIllegal),
            (basic(&[], &["api"], "web"), ErrorKind::ParamIllegal),
            (basic(&["a.b.shop.com"], &[], "web"), ErrorKind::ParamIllegal),
            (basic(&["www.shop.com"], &[], "missing"), ErrorKind::RecordNotExist),
            (basic(&["www.shop.com"], &[], "cold"), ErrorKind::DependentUnReady),
        ];
        for (rule, kind) in cases {
            let rules = ProductRouteRule { basic_rules: vec![rule.clone()], ..valid_rules() };
            let err = service.upsert_product_rule("shop", rules).await.unwrap_err();
            assert_eq!(err.kind(), kind, "{:?}", rule);
        }

        let mut reserved = valid_rules();
        reserved
            .advanced_rules
            .insert(0, advanced("adv", "req_path_in(\"/x\", false)", "GO_TO_ADVANCED_RULES"));
        let err = service.upsert_product_rule("shop", reserved).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamIllegal);
    }

    #[tokio::test]
    async fn test_cluster_checker() {
        let (store, service) = setup().await;
        service.upsert_product_rule("shop", valid_rules()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let product = require_product(&mut *tx, "shop").await.unwrap();
        let web = require_cluster(&mut *tx, &product, "web").await.unwrap();
        let web = assemble_cluster(&mut *tx, web, false).await.unwrap();
        let cold = require_cluster(&mut *tx, &product, "cold").await.unwrap();
        let cold = assemble_cluster(&mut *tx, cold, false).await.unwrap();

        let checker = RouteRuleClusterChecker;
        assert!(checker.check(&mut *tx, &product, &web).await.unwrap().is_some());
        assert!(checker.check(&mut *tx, &product, &cold).await.unwrap().is_none());
    }
}
