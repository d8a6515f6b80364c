//! Fleet fixtures shared by the control plane integration tests

use std::collections::BTreeMap;
use std::sync::Arc;

use switchyard::config::ControlConfig;
use switchyard::domain::pool::DEFAULT_PORT_NAME;
use switchyard::domain::{Instance, PoolType, BUILTIN_PRODUCT_NAME};
use switchyard::errors::{ErrorKind, SwitchyardError};
use switchyard::services::{
    CreateBfeClusterRequest, CreateClusterRequest, CreateDomainRequest, CreatePoolRequest,
    CreateProductRequest, CreateSubClusterRequest,
};
use switchyard::storage::{MemoryStore, Store};
use switchyard::ControlPlane;

pub fn control_plane() -> ControlPlane {
    control_plane_with(ControlConfig::default())
}

pub fn control_plane_with(config: ControlConfig) -> ControlPlane {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    ControlPlane::new(store, config)
}

pub fn instance(hostname: &str, ip: &str, weight: i32) -> Instance {
    Instance {
        hostname: hostname.to_string(),
        ip: ip.to_string(),
        weight,
        ports: BTreeMap::from([(DEFAULT_PORT_NAME.to_string(), 8080)]),
        tags: BTreeMap::new(),
    }
}

/// One infrastructure pool and BFE cluster per name
pub async fn add_bfe_clusters(plane: &ControlPlane, names: &[&str]) {
    for (index, name) in names.iter().enumerate() {
        let lb = instance(&format!("{}-lb", name), &format!("10.255.0.{}", index + 1), 1);
        let pool = plane
            .pools()
            .create_pool(
                BUILTIN_PRODUCT_NAME,
                CreatePoolRequest {
                    name: (*name).to_string(),
                    pool_type: PoolType::Static,
                    instances: vec![lb],
                },
            )
            .await
            .unwrap();
        plane
            .bfe_clusters()
            .create_bfe_cluster(CreateBfeClusterRequest {
                name: (*name).to_string(),
                pool_name: pool.name,
                capacity: 1000,
            })
            .await
            .unwrap();
    }
}

/// A product with one ready static pool per sub-cluster
pub async fn add_product(plane: &ControlPlane, product: &str, sub_clusters: &[&str]) {
    plane
        .products()
        .create_product(CreateProductRequest {
            name: product.to_string(),
            description: format!("{} product", product),
            mail_list: vec![format!("ops@{}.example.com", product)],
            contact: vec![],
        })
        .await
        .unwrap();

    for (index, sub_cluster) in sub_clusters.iter().enumerate() {
        add_sub_cluster(plane, product, sub_cluster, PoolType::Static, vec![instance(
            &format!("{}-{}", product, sub_cluster),
            &format!("10.0.{}.1", index),
            10,
        )])
        .await;
    }
}

pub async fn add_sub_cluster(
    plane: &ControlPlane,
    product: &str,
    sub_cluster: &str,
    pool_type: PoolType,
    instances: Vec<Instance>,
) {
    let pool = plane
        .pools()
        .create_pool(product, CreatePoolRequest {
            name: format!("{}-pool", sub_cluster),
            pool_type,
            instances,
        })
        .await
        .unwrap();
    plane
        .sub_clusters()
        .create_sub_cluster(
            product,
            CreateSubClusterRequest {
                name: sub_cluster.to_string(),
                pool_name: pool.name,
                description: String::new(),
            },
        )
        .await
        .unwrap();
}

pub async fn add_domain(plane: &ControlPlane, product: &str, name: &str) {
    plane
        .domains()
        .create_domain(
            product,
            CreateDomainRequest {
                name: name.to_string(),
                using_advanced_redirect: false,
                using_advanced_hsts: false,
            },
        )
        .await
        .unwrap();
}

pub fn cluster_request(name: &str, sub_clusters: &[&str]) -> CreateClusterRequest {
    CreateClusterRequest {
        name: name.to_string(),
        description: String::new(),
        basic: Default::default(),
        sticky_sessions: Default::default(),
        passive_health_check: Default::default(),
        sub_clusters: sub_clusters.iter().map(|s| s.to_string()).collect(),
        scheduler: None,
    }
}

pub fn assert_kind<T: std::fmt::Debug>(result: Result<T, SwitchyardError>, kind: ErrorKind) {
    match result {
        Err(err) => assert_eq!(err.kind(), kind, "unexpected error: {}", err),
        Ok(value) => panic!("expected {:?}, got {:?}", kind, value),
    }
}
