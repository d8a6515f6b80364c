//! Product business logic service

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::lookup::require_product;
use super::validation::{validate_email_list, validate_entity_name};
use crate::domain::Product;
use crate::errors::{Result, SwitchyardError};
use crate::storage::{
    ClusterFilter, DomainFilter, NewProduct, PoolFilter, ProductFilter, Store, SubClusterFilter,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(custom(function = "validate_entity_name"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub description: String,
    #[serde(default)]
    #[validate(custom(function = "validate_email_list"))]
    pub mail_list: Vec<String>,
    #[serde(default)]
    pub contact: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_email_list"))]
    pub mail_list: Option<Vec<String>>,
    pub contact: Option<Vec<String>>,
}

/// Service for managing products
pub struct ProductService {
    store: Arc<dyn Store>,
}

impl ProductService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, request), fields(product = %request.name), name = "create_product")]
    pub async fn create_product(&self, request: CreateProductRequest) -> Result<Product> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        if !tx.fetch_products(&ProductFilter::by_name(&request.name)).await?.is_empty() {
            return Err(SwitchyardError::existed("Product", &request.name));
        }

        let product = tx
            .create_product(&NewProduct {
                name: request.name,
                description: request.description,
                mail_list: request.mail_list,
                contact: request.contact,
            })
            .await?;
        tx.commit().await?;

        info!(product_id = %product.id, product = %product.name, "Product created");
        Ok(product)
    }

    #[instrument(skip(self, request), name = "update_product")]
    pub async fn update_product(
        &self,
        name: &str,
        request: UpdateProductRequest,
    ) -> Result<Product> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let mut product = require_product(&mut *tx, name).await?;
        if product.is_builtin() {
            return Err(SwitchyardError::model(format!(
                "Built-in product '{}' cannot be modified",
                product.name
            )));
        }

        if let Some(description) = request.description {
            product.description = description;
        }
        if let Some(mail_list) = request.mail_list {
            product.mail_list = mail_list;
        }
        if let Some(contact) = request.contact {
            product.contact = contact;
        }

        tx.update_product(&product).await?;
        tx.commit().await?;

        info!(product_id = %product.id, product = %product.name, "Product updated");
        Ok(product)
    }

    /// Delete a product that no longer owns any entity
    #[instrument(skip(self), name = "delete_product")]
    pub async fn delete_product(&self, name: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, name).await?;
        if product.is_builtin() {
            return Err(SwitchyardError::model(format!(
                "Built-in product '{}' cannot be deleted",
                product.name
            )));
        }

        let clusters = tx.fetch_clusters(&ClusterFilter::by_product(product.id)).await?;
        let sub_clusters = tx.fetch_sub_clusters(&SubClusterFilter::by_product(product.id)).await?;
        let pools = tx.fetch_pools(&PoolFilter::by_product(product.id)).await?;
        let domains = tx.fetch_domains(&DomainFilter::by_product(product.id)).await?;
        let owned = [
            ("clusters", clusters.len()),
            ("sub clusters", sub_clusters.len()),
            ("pools", pools.len()),
            ("domains", domains.len()),
        ];
        if let Some((kind, count)) = owned.iter().find(|(_, count)| *count > 0) {
            return Err(SwitchyardError::model(format!(
                "Product '{}' still owns {} {}; delete them first",
                product.name, count, kind
            )));
        }

        tx.delete_route_rules(product.id).await?;
        tx.delete_product(product.id).await?;
        tx.commit().await?;

        info!(product_id = %product.id, product = %product.name, "Product deleted");
        Ok(())
    }

    pub async fn fetch_product(&self, name: &str) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        require_product(&mut *tx, name).await
    }

    pub async fn fetch_products(&self) -> Result<Vec<Product>> {
        let mut tx = self.store.begin().await?;
        tx.fetch_products(&ProductFilter::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PoolTag, PoolType};
    use crate::errors::ErrorKind;
    use crate::storage::{MemoryStore, NewPool};

    fn setup() -> (Arc<dyn Store>, ProductService) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        (store.clone(), ProductService::new(store))
    }

    fn request(name: &str) -> CreateProductRequest {
        CreateProductRequest {
            name: name.to_string(),
            description: String::new(),
            mail_list: vec!["ops@example.com".to_string()],
            contact: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let (_, service) = setup();
        service.create_product(request("shop")).await.unwrap();

        let product = service.fetch_product("shop").await.unwrap();
        assert_eq!(product.mail_list, vec!["ops@example.com".to_string()]);
        assert_eq!(service.fetch_products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_record_existed() {
        let (_, service) = setup();
        service.create_product(request("shop")).await.unwrap();
        let err = service.create_product(request("shop")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordExisted);
    }

    #[tokio::test]
    async fn test_invalid_name_is_param_illegal() {
        let (_, service) = setup();
        let err = service.create_product(request("sh.op")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamIllegal);
    }

    #[tokio::test]
    async fn test_builtin_product_is_protected() {
        let (_, service) = setup();
        let err = service.delete_product("BFE").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelViolation);

        let err = service.update_product("BFE", UpdateProductRequest::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelViolation);
    }

    #[tokio::test]
    async fn test_delete_requires_empty_product() {
        let (store, service) = setup();
        let product = service.create_product(request("shop")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.create_pool(&NewPool {
            name: "shop.web".to_string(),
            product_id: product.id,
            tag: PoolTag::Product,
            pool_type: PoolType::Static,
            instances: vec![],
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let err = service.delete_product("shop").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelViolation);
        assert!(err.to_string().contains("pools"));

        let (_, empty) = setup();
        empty.create_product(request("other")).await.unwrap();
        empty.delete_product("other").await.unwrap();
        assert!(matches!(
            empty.fetch_product("other").await.unwrap_err(),
            SwitchyardError::RecordNotExist { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_product() {
        let (_, service) = setup();
        service.create_product(request("shop")).await.unwrap();

        let updated = service
            .update_product(
                "shop",
                UpdateProductRequest {
                    description: Some("storefront".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description, "storefront");
        assert_eq!(updated.mail_list, vec!["ops@example.com".to_string()]);
    }
}
