//! Domain business logic service

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::lookup::require_product;
use super::route_rule_service::host_in_rules;
use super::validation::validate_hostname;
use crate::domain::hostname::{conflicts, normalize};
use crate::domain::Domain;
use crate::errors::{Result, SwitchyardError};
use crate::storage::{DomainFilter, NewDomain, Store};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateDomainRequest {
    #[validate(custom(function = "validate_hostname"))]
    pub name: String,
    #[serde(default)]
    pub using_advanced_redirect: bool,
    #[serde(default)]
    pub using_advanced_hsts: bool,
}

/// Service for managing product hostnames
pub struct DomainService {
    store: Arc<dyn Store>,
}

impl DomainService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register a hostname. Names are unique across the fleet and a wildcard
    /// may not overlap a literal name in either direction.
    #[instrument(skip(self, request), fields(domain = %request.name), name = "create_domain")]
    pub async fn create_domain(
        &self,
        product_name: &str,
        request: CreateDomainRequest,
    ) -> Result<Domain> {
        request.validate()?;
        let name = normalize(&request.name);

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;

        let existing = tx.fetch_domains(&DomainFilter::default()).await?;
        if let Some(clash) = existing.iter().find(|d| conflicts(&d.name, &name)) {
            if clash.name != name {
                warn!(
                    domain = %name,
                    existing = %clash.name,
                    "Domain overlaps a registered wildcard"
                );
            }
            let shown = if clash.name == name {
                name
            } else {
                format!("{} (overlaps {})", name, clash.name)
            };
            return Err(SwitchyardError::existed("Domain", shown));
        }

        let domain = tx
            .create_domain(&NewDomain {
                name,
                product_id: product.id,
                using_advanced_redirect: request.using_advanced_redirect,
                using_advanced_hsts: request.using_advanced_hsts,
            })
            .await?;
        tx.commit().await?;

        info!(
            domain_id = %domain.id,
            domain = %domain.name,
            product = %product.name,
            "Domain created"
        );
        Ok(domain)
    }

    /// Delete a hostname no route rule or TLS policy depends on
    #[instrument(skip(self), name = "delete_domain")]
    pub async fn delete_domain(&self, product_name: &str, name: &str) -> Result<()> {
        let name = normalize(name);

        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        let domain = tx
            .fetch_domains(&DomainFilter { product_id: Some(product.id), name: Some(name.clone()) })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SwitchyardError::not_exist("Domain", &name))?;

        if domain.used_by_tls_policy() {
            return Err(SwitchyardError::unready(format!(
                "Domain '{}' carries an HTTPS redirect or HSTS policy; remove it first",
                domain.name
            )));
        }
        if host_in_rules(&mut *tx, &domain.name).await? {
            return Err(SwitchyardError::unready(format!(
                "Domain '{}' is still used by route rules",
                domain.name
            )));
        }

        tx.delete_domain(domain.id).await?;
        tx.commit().await?;

        info!(domain_id = %domain.id, domain = %domain.name, "Domain deleted");
        Ok(())
    }

    pub async fn fetch_domains(&self, product_name: &str) -> Result<Vec<Domain>> {
        let mut tx = self.store.begin().await?;
        let product = require_product(&mut *tx, product_name).await?;
        tx.fetch_domains(&DomainFilter::by_product(product.id)).await
    }
}
