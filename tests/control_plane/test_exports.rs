//! Versioned exports of every data-plane topic

use switchyard::config::ControlConfig;
use switchyard::domain::{AdvancedRule, ProductRouteRule, BLACKHOLE, DEFAULT_CONDITION};
use switchyard::errors::ErrorKind;
use switchyard::export::{gslb_topic, CERTIFICATE_TOPIC, ROUTE_RULE_TOPIC};
use switchyard::services::{CreateCertificateRequest, UpdateClusterRequest};

use crate::support::*;

fn version_number(version: &str) -> u64 {
    version.parse().expect("numeric version")
}

fn fallback_to(cluster: &str) -> ProductRouteRule {
    ProductRouteRule {
        basic_rules: vec![],
        advanced_rules: vec![AdvancedRule {
            name: "fallback".to_string(),
            expression: DEFAULT_CONDITION.to_string(),
            cluster_name: cluster.to_string(),
            cluster_id: None,
            description: String::new(),
        }],
    }
}

async fn fleet() -> switchyard::ControlPlane {
    let plane = control_plane_with(ControlConfig {
        default_product: Some("shop".to_string()),
        ..Default::default()
    });
    add_bfe_clusters(&plane, &["bfe1", "bfe2"]).await;
    add_product(&plane, "shop", &["s1", "s2"]).await;
    add_domain(&plane, "shop", "www.shop.com").await;
    plane.clusters().create_cluster("shop", cluster_request("web", &["s1", "s2"])).await.unwrap();
    plane
}

#[tokio::test]
async fn unchanged_content_keeps_its_version() {
    let plane = fleet().await;
    plane.route_rules().upsert_product_rule("shop", fallback_to("web")).await.unwrap();
    let exports = plane.exports();

    let first = exports.export_route_rule(None).await.unwrap().expect("first export");
    let second = exports.export_route_rule(None).await.unwrap().expect("second export");
    assert_eq!(first, second);
    assert_eq!(first.product_rule["shop"][0].cluster_name, "web");
    assert_eq!(first.product_rule["shop"][0].cond, DEFAULT_CONDITION);

    assert!(exports.export_route_rule(Some(&first.version)).await.unwrap().is_none());

    let ledger = exports.version_control().latest_version(ROUTE_RULE_TOPIC).await.unwrap().unwrap();
    assert_eq!(ledger.version, first.version);
}

#[tokio::test]
async fn changed_content_mints_a_greater_version() {
    let plane = fleet().await;
    let exports = plane.exports();
    let before = exports.export_gslb("bfe1", None).await.unwrap().unwrap();
    assert_eq!(before.hostname, "bfe1");
    assert_eq!(before.clusters["web"]["s1"], 50);

    let scheduler = plane
        .clusters()
        .fetch_cluster("shop", "web")
        .await
        .unwrap()
        .scheduler
        .unwrap()
        .into_rows()
        .into_iter()
        .map(|(bfe, mut row)| {
            if bfe == "bfe1" {
                row.insert("s1".to_string(), 80);
                row.insert("s2".to_string(), 20);
            }
            (bfe, row)
        })
        .collect();
    plane
        .clusters()
        .update_cluster(
            "shop",
            "web",
            UpdateClusterRequest {
                scheduler: Some(switchyard::domain::LbMatrix::from_rows(scheduler)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let after = exports
        .export_gslb("bfe1", Some(&before.ts))
        .await
        .unwrap()
        .expect("changed payload");
    assert!(version_number(&after.ts) > version_number(&before.ts));
    assert_eq!(after.clusters["web"]["s1"], 80);
    assert_eq!(after.clusters["web"][BLACKHOLE], 0);

    // bfe2's row did not change
    let bfe2 = exports.export_gslb("bfe2", None).await.unwrap().unwrap();
    assert!(exports.export_gslb("bfe2", Some(&bfe2.ts)).await.unwrap().is_none());
    assert_eq!(
        exports
            .version_control()
            .latest_version(&gslb_topic("bfe2"))
            .await
            .unwrap()
            .unwrap()
            .version,
        bfe2.ts
    );
}

#[tokio::test]
async fn unknown_bfe_cluster_and_topic_are_rejected() {
    let plane = fleet().await;
    assert_kind(plane.exports().export_gslb("bfe9", None).await, ErrorKind::RecordNotExist);
    assert_kind(plane.exports().export_topic("gslb.", None).await, ErrorKind::ParamIllegal);
    assert_kind(plane.exports().export_topic("listeners", None).await, ErrorKind::ParamIllegal);
}

#[tokio::test]
async fn host_cluster_and_instance_tables() {
    let plane = fleet().await;
    let exports = plane.exports();

    let hosts = exports.export_host_table(None).await.unwrap().unwrap();
    assert_eq!(hosts.default_product.as_deref(), Some("shop"));
    assert_eq!(hosts.hosts["shop"], vec!["www.shop.com".to_string()]);
    assert_eq!(hosts.host_tags["shop"], vec!["shop".to_string()]);

    let clusters = exports.export_cluster_table(None).await.unwrap().unwrap();
    assert!(clusters.config.contains_key("web"));

    let instances = exports.export_instance_table(None).await.unwrap().unwrap();
    let web = &instances.config["web"];
    assert_eq!(web["s1"][0].addr, "10.0.0.1");
    assert_eq!(web["s1"][0].port, 8080);
    assert_eq!(web["s2"][0].name, "shop-s2");

    let json = exports.export_topic("instance_table", None).await.unwrap().unwrap();
    assert_eq!(json["Version"], instances.version);
}

#[tokio::test]
async fn missing_default_product_fails_the_host_table() {
    let plane = control_plane_with(ControlConfig {
        default_product: Some("ghost".to_string()),
        ..Default::default()
    });
    assert_kind(plane.exports().export_host_table(None).await, ErrorKind::RecordNotExist);
}

#[tokio::test]
async fn certificates_export_with_their_default() {
    let plane = control_plane();
    let request = |name: &str, is_default: bool| CreateCertificateRequest {
        name: name.to_string(),
        description: String::new(),
        is_default,
        cert_file_path: format!("/etc/bfe/tls/{}.crt", name),
        key_file_path: format!("/etc/bfe/tls/{}.key", name),
        expired_date: "2030-01-01".to_string(),
    };

    let first = plane.certificates().create_certificate(request("shop", false)).await.unwrap();
    assert!(first.is_default);
    plane.certificates().create_certificate(request("news", true)).await.unwrap();

    let json = plane.exports().export_topic(CERTIFICATE_TOPIC, None).await.unwrap().unwrap();
    assert_eq!(json["Config"]["Default"], "news");
    assert_eq!(json["Config"]["CertConf"]["shop"]["ServerCertFile"], "/etc/bfe/tls/shop.crt");
    assert!(json["Config"]["CertConf"]["shop"].get("OcspResponseFile").is_none());

    assert_kind(plane.certificates().delete_certificate("news").await, ErrorKind::ModelViolation);
    plane.certificates().delete_certificate("shop").await.unwrap();
    plane.certificates().delete_certificate("news").await.unwrap();
}
