//! Domains, route rules and the references between them and clusters

use switchyard::domain::{
    host_condition, AdvancedRule, BasicRule, ProductRouteRule, ADVANCED_MODE_CLUSTER,
    DEFAULT_CONDITION,
};
use switchyard::errors::ErrorKind;
use switchyard::services::CreateDomainRequest;

use crate::support::*;

fn basic(hosts: &[&str], paths: &[&str], cluster: &str) -> BasicRule {
    BasicRule {
        host_names: hosts.iter().map(|h| h.to_string()).collect(),
        paths: paths.iter().map(|p| p.to_string()).collect(),
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

async fn shop_with_clusters() -> switchyard::ControlPlane {
    let plane = control_plane();
    add_bfe_clusters(&plane, &["bfe1"]).await;
    add_product(&plane, "shop", &["s1", "s2"]).await;
    add_domain(&plane, "shop", "www.shop.com").await;
    add_domain(&plane, "shop", "*.img.shop.com").await;
    plane.clusters().create_cluster("shop", cluster_request("web", &["s1"])).await.unwrap();
    plane.clusters().create_cluster("shop", cluster_request("static", &["s2"])).await.unwrap();
    plane
}

#[tokio::test]
async fn wildcard_domains_conflict_across_products() {
    let plane = control_plane();
    add_product(&plane, "shop", &[]).await;
    add_product(&plane, "news", &[]).await;
    add_domain(&plane, "shop", "*.shop.com").await;

    let request = |name: &str| CreateDomainRequest {
        name: name.to_string(),
        using_advanced_redirect: false,
        using_advanced_hsts: false,
    };

    assert_kind(
        plane.domains().create_domain("news", request("www.shop.com")).await,
        ErrorKind::RecordExisted,
    );
    assert_kind(
        plane.domains().create_domain("news", request("*.SHOP.com")).await,
        ErrorKind::RecordExisted,
    );

    add_domain(&plane, "news", "www.news.com").await;
    assert_kind(
        plane.domains().create_domain("shop", request("*.news.com")).await,
        ErrorKind::RecordExisted,
    );

    // deeper names are not covered by a single-label wildcard
    add_domain(&plane, "news", "a.b.shop.com").await;
    assert_eq!(plane.domains().fetch_domains("news").await.unwrap().len(), 2);
}

#[tokio::test]
async fn rules_resolve_clusters_and_reserved_targets() {
    let plane = shop_with_clusters().await;

    let rules = ProductRouteRule {
        basic_rules: vec![
            basic(&["www.shop.com"], &["/static/"], "static"),
            basic(&["a.img.shop.com"], &[], "web"),
            basic(&[], &["/api/"], ADVANCED_MODE_CLUSTER),
        ],
        advanced_rules: vec![advanced("fallback", DEFAULT_CONDITION, "web")],
    };
    let stored = plane.route_rules().upsert_product_rule("shop", rules).await.unwrap();

    assert!(stored.basic_rules[0].cluster_id.is_some());
    assert!(stored.basic_rules[2].cluster_id.is_none());
    assert_eq!(plane.route_rules().fetch_product_rule("shop").await.unwrap(), stored);
    assert!(plane.route_rules().cluster_referenced("shop", "static").await.unwrap());
    assert!(plane.route_rules().domain_referenced("www.shop.com").await.unwrap());
}

#[tokio::test]
async fn rejected_rules_leave_previous_rules_in_place() {
    let plane = shop_with_clusters().await;
    let original = plane
        .route_rules()
        .upsert_product_rule(
            "shop",
            ProductRouteRule {
                basic_rules: vec![basic(&["www.shop.com"], &[], "web")],
                advanced_rules: vec![advanced("fallback", DEFAULT_CONDITION, "static")],
            },
        )
        .await
        .unwrap();

    let without_catch_all = ProductRouteRule {
        basic_rules: vec![],
        advanced_rules: vec![advanced("api", "req_path_prefix_in(\"/api\", false)", "web")],
    };
    assert_kind(
        plane.route_rules().upsert_product_rule("shop", without_catch_all).await,
        ErrorKind::ParamIllegal,
    );

    let foreign_host = ProductRouteRule {
        basic_rules: vec![basic(&["www.news.com"], &[], "web")],
        advanced_rules: vec![advanced("fallback", DEFAULT_CONDITION, "web")],
    };
    assert_kind(
        plane.route_rules().upsert_product_rule("shop", foreign_host).await,
        ErrorKind::ParamIllegal,
    );

    let missing_cluster = ProductRouteRule {
        basic_rules: vec![],
        advanced_rules: vec![advanced("fallback", DEFAULT_CONDITION, "ghost")],
    };
    assert_kind(
        plane.route_rules().upsert_product_rule("shop", missing_cluster).await,
        ErrorKind::RecordNotExist,
    );

    assert_eq!(plane.route_rules().fetch_product_rule("shop").await.unwrap(), original);
}

#[tokio::test]
async fn referenced_clusters_and_domains_cannot_be_deleted() {
    let plane = shop_with_clusters().await;
    plane
        .route_rules()
        .upsert_product_rule(
            "shop",
            ProductRouteRule {
                basic_rules: vec![],
                advanced_rules: vec![
                    advanced("www", &host_condition("www.shop.com"), "web"),
                    advanced("fallback", DEFAULT_CONDITION, "static"),
                ],
            },
        )
        .await
        .unwrap();

    assert_kind(plane.clusters().delete_cluster("shop", "web").await, ErrorKind::ModelViolation);
    assert_kind(
        plane.domains().delete_domain("shop", "www.shop.com").await,
        ErrorKind::DependentUnReady,
    );

    plane
        .route_rules()
        .upsert_product_rule(
            "shop",
            ProductRouteRule {
                basic_rules: vec![],
                advanced_rules: vec![advanced("fallback", DEFAULT_CONDITION, "static")],
            },
        )
        .await
        .unwrap();

    plane.clusters().delete_cluster("shop", "web").await.unwrap();
    plane.domains().delete_domain("shop", "www.shop.com").await.unwrap();
    assert_kind(plane.clusters().fetch_cluster("shop", "web").await, ErrorKind::RecordNotExist);
}

#[tokio::test]
async fn tls_policies_keep_a_domain_alive() {
    let plane = control_plane();
    add_product(&plane, "shop", &[]).await;
    plane
        .domains()
        .create_domain(
            "shop",
            CreateDomainRequest {
                name: "pay.shop.com".to_string(),
                using_advanced_redirect: false,
                using_advanced_hsts: true,
            },
        )
        .await
        .unwrap();

    assert_kind(
        plane.domains().delete_domain("shop", "pay.shop.com").await,
        ErrorKind::DependentUnReady,
    );
}
