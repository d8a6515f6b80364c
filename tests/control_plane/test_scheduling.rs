//! Clusters, sub-cluster binding and LB matrix maintenance

use std::collections::BTreeMap;

use switchyard::config::ControlConfig;
use switchyard::domain::{LbMatrix, LbRow, PoolType, BLACKHOLE};
use switchyard::errors::ErrorKind;
use switchyard::services::{UpdateClusterRequest, UpdateSubClusterRequest};

use crate::support::*;

fn row(entries: &[(&str, i32)]) -> LbRow {
    entries.iter().map(|(name, weight)| (name.to_string(), *weight)).collect()
}

#[tokio::test]
async fn default_scheduler_splits_evenly_with_blackhole_remainder() {
    let plane = control_plane();
    add_bfe_clusters(&plane, &["bfe1", "bfe2"]).await;
    add_product(&plane, "shop", &["s1", "s2", "s3"]).await;

    let cluster = plane
        .clusters()
        .create_cluster("shop", cluster_request("web", &["s1", "s2", "s3"]))
        .await
        .unwrap();

    assert!(cluster.ready);
    assert_eq!(cluster.sub_clusters.len(), 3);
    let scheduler = cluster.scheduler.expect("scheduler");
    let expected = row(&[("s1", 33), ("s2", 33), ("s3", 33), (BLACKHOLE, 1)]);
    assert_eq!(scheduler.rows().len(), 2);
    assert_eq!(scheduler.row("bfe1"), Some(&expected));
    assert_eq!(scheduler.row("bfe2"), Some(&expected));
}

#[tokio::test]
async fn explicit_scheduler_must_cover_every_bfe_cluster() {
    let plane = control_plane();
    add_bfe_clusters(&plane, &["bfe1", "bfe2"]).await;
    add_product(&plane, "shop", &["s1", "s2"]).await;

    let mut request = cluster_request("web", &["s1", "s2"]);
    let partial = BTreeMap::from([("bfe1".to_string(), row(&[("s1", 100), ("s2", 0)]))]);
    request.scheduler = Some(LbMatrix::from_rows(partial));
    assert_kind(plane.clusters().create_cluster("shop", request).await, ErrorKind::ParamIllegal);
    assert!(plane.clusters().fetch_clusters("shop").await.unwrap().is_empty());

    let mut request = cluster_request("web", &["s1", "s2"]);
    request.scheduler = Some(LbMatrix::from_rows(BTreeMap::from([
        ("bfe1".to_string(), row(&[("s1", 100), ("s2", 0)])),
        ("bfe2".to_string(), row(&[("s1", 20), ("s2", 70), (BLACKHOLE, 10)])),
    ])));
    let cluster = plane.clusters().create_cluster("shop", request).await.unwrap();
    assert_eq!(cluster.scheduler.unwrap().row("bfe2").unwrap()[BLACKHOLE], 10);
}

#[tokio::test]
async fn new_bfe_cluster_adds_a_default_row_to_every_matrix() {
    let plane = control_plane();
    add_bfe_clusters(&plane, &["bfe1"]).await;
    add_product(&plane, "shop", &["s1", "s2"]).await;
    plane.clusters().create_cluster("shop", cluster_request("web", &["s1", "s2"])).await.unwrap();

    add_bfe_clusters(&plane, &["bfe2"]).await;

    let scheduler = plane.clusters().fetch_cluster("shop", "web").await.unwrap().scheduler.unwrap();
    assert_eq!(scheduler.row("bfe2"), Some(&row(&[("s1", 50), ("s2", 50), (BLACKHOLE, 0)])));

    plane.bfe_clusters().delete_bfe_cluster("bfe1").await.unwrap();
    let scheduler = plane.clusters().fetch_cluster("shop", "web").await.unwrap().scheduler.unwrap();
    assert!(scheduler.row("bfe1").is_none());
    assert_eq!(scheduler.rows().len(), 1);
}

#[tokio::test]
async fn rebind_requires_draining_first() {
    let plane = control_plane();
    add_bfe_clusters(&plane, &["bfe1", "bfe2"]).await;
    add_product(&plane, "shop", &["s1", "s2", "s3"]).await;
    plane.clusters().create_cluster("shop", cluster_request("web", &["s1", "s2"])).await.unwrap();

    let target = vec!["s2".to_string(), "s3".to_string()];
    assert_kind(
        plane.clusters().rebind_sub_clusters("shop", "web", target.clone()).await,
        ErrorKind::ModelViolation,
    );

    let unchanged = plane.clusters().fetch_cluster("shop", "web").await.unwrap();
    let names: Vec<_> = unchanged.sub_clusters.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["s1", "s2"]);
    let s3 = plane.sub_clusters().fetch_sub_cluster("shop", "s3").await.unwrap();
    assert!(s3.cluster_id.is_none());

    let drained = LbMatrix::from_rows(
        ["bfe1", "bfe2"]
            .iter()
            .map(|bfe| (bfe.to_string(), row(&[("s1", 0), ("s2", 100)])))
            .collect(),
    );
    plane
        .clusters()
        .update_cluster("shop", "web", UpdateClusterRequest {
            scheduler: Some(drained),
            ..Default::default()
        })
        .await
        .unwrap();

    let rebound = plane.clusters().rebind_sub_clusters("shop", "web", target).await.unwrap();
    let names: Vec<_> = rebound.sub_clusters.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["s2", "s3"]);
    assert_eq!(rebound.scheduler.unwrap().row("bfe1"), Some(&row(&[("s2", 100), ("s3", 0)])));
    let s1 = plane.sub_clusters().fetch_sub_cluster("shop", "s1").await.unwrap();
    assert!(s1.cluster_id.is_none());
    plane.sub_clusters().delete_sub_cluster("shop", "s1").await.unwrap();
}

#[tokio::test]
async fn mounted_sub_clusters_are_protected() {
    let plane = control_plane();
    add_bfe_clusters(&plane, &["bfe1"]).await;
    add_product(&plane, "shop", &["s1", "s2"]).await;
    plane.clusters().create_cluster("shop", cluster_request("web", &["s1"])).await.unwrap();

    assert_kind(
        plane.sub_clusters().delete_sub_cluster("shop", "s1").await,
        ErrorKind::ModelViolation,
    );
    assert_kind(
        plane
            .sub_clusters()
            .update_sub_cluster(
                "shop",
                "s1",
                UpdateSubClusterRequest {
                    pool_name: Some("s2-pool".to_string()),
                    description: None,
                },
            )
            .await,
        ErrorKind::ModelViolation,
    );
    assert_kind(
        plane.clusters().create_cluster("shop", cluster_request("api", &["s1"])).await,
        ErrorKind::ModelViolation,
    );

    plane.clusters().delete_cluster("shop", "web").await.unwrap();
    plane.sub_clusters().delete_sub_cluster("shop", "s1").await.unwrap();
}

#[tokio::test]
async fn unready_sub_clusters_block_binding_unless_checks_are_off() {
    for ignore_readiness_check in [false, true] {
        let plane = control_plane_with(ControlConfig {
            ignore_readiness_check,
            ..Default::default()
        });
        add_bfe_clusters(&plane, &["bfe1"]).await;
        add_product(&plane, "shop", &[]).await;
        add_sub_cluster(&plane, "shop", "cold", PoolType::Registry, vec![]).await;

        let result = plane
            .clusters()
            .create_cluster("shop", cluster_request("web", &["cold"]))
            .await;
        if ignore_readiness_check {
            assert!(result.unwrap().ready);
        } else {
            assert_kind(result, ErrorKind::DependentUnReady);
        }
    }
}

#[tokio::test]
async fn pools_in_use_cannot_be_deleted() {
    let plane = control_plane();
    add_bfe_clusters(&plane, &["bfe1"]).await;
    add_product(&plane, "shop", &["s1"]).await;

    assert!(!plane.pools().pool_deletable("shop", "s1-pool").await.unwrap());
    assert_kind(plane.pools().delete_pool("shop", "s1-pool").await, ErrorKind::ModelViolation);
    assert_kind(plane.pools().delete_pool("BFE", "bfe1").await, ErrorKind::ModelViolation);

    plane.sub_clusters().delete_sub_cluster("shop", "s1").await.unwrap();
    plane.pools().delete_pool("shop", "s1-pool").await.unwrap();
}
