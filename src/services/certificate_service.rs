//! TLS server certificate service
//!
//! Exactly one certificate is the default once any exists. File contents are
//! not inspected; only the paths the data plane loads are recorded.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::validation::validate_entity_name;
use crate::domain::Certificate;
use crate::errors::{Result, SwitchyardError};
use crate::storage::{CertificateFilter, NewCertificate, Store, StoreTx};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCertificateRequest {
    #[validate(custom(function = "validate_entity_name"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
    #[validate(length(min = 1, message = "Certificate file path is required"))]
    pub cert_file_path: String,
    #[validate(length(min = 1, message = "Key file path is required"))]
    pub key_file_path: String,
    #[serde(default)]
    pub expired_date: String,
}

pub struct CertificateService {
    store: Arc<dyn Store>,
}

impl CertificateService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(
        skip(self, request),
        fields(certificate = %request.name),
        name = "create_certificate"
    )]
    pub async fn create_certificate(
        &self,
        request: CreateCertificateRequest,
    ) -> Result<Certificate> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        if !tx.fetch_certificates(&CertificateFilter::by_name(&request.name)).await?.is_empty() {
            return Err(SwitchyardError::existed("Certificate", &request.name));
        }

        let first = tx.fetch_certificates(&CertificateFilter::default()).await?.is_empty();
        let make_default = first || request.is_default;

        let mut certificate = tx
            .create_certificate(&NewCertificate {
                name: request.name,
                description: request.description,
                is_default: false,
                cert_file_path: request.cert_file_path,
                key_file_path: request.key_file_path,
                expired_date: request.expired_date,
            })
            .await?;
        if make_default {
            tx.set_default_certificate(certificate.id).await?;
            certificate.is_default = true;
        }
        tx.commit().await?;

        info!(
            certificate_id = %certificate.id,
            certificate = %certificate.name,
            is_default = certificate.is_default,
            "Certificate created"
        );
        Ok(certificate)
    }

    #[instrument(skip(self), name = "set_default_certificate")]
    pub async fn set_default_certificate(&self, name: &str) -> Result<Certificate> {
        let mut tx = self.store.begin().await?;
        let mut certificate = require_certificate(&mut *tx, name).await?;
        tx.set_default_certificate(certificate.id).await?;
        tx.commit().await?;

        certificate.is_default = true;
        info!(certificate = %certificate.name, "Default certificate changed");
        Ok(certificate)
    }

    #[instrument(skip(self), name = "delete_certificate")]
    pub async fn delete_certificate(&self, name: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let certificate = require_certificate(&mut *tx, name).await?;

        let registered = tx.fetch_certificates(&CertificateFilter::default()).await?.len();
        if certificate.is_default && registered > 1 {
            return Err(SwitchyardError::model(format!(
                "Certificate '{}' is the default; choose another default before deleting it",
                certificate.name
            )));
        }

        tx.delete_certificate(certificate.id).await?;
        tx.commit().await?;

        info!(certificate = %certificate.name, "Certificate deleted");
        Ok(())
    }

    pub async fn fetch_certificates(&self) -> Result<Vec<Certificate>> {
        let mut tx = self.store.begin().await?;
        tx.fetch_certificates(&CertificateFilter::default()).await
    }
}

async fn require_certificate(tx: &mut dyn StoreTx, name: &str) -> Result<Certificate> {
    tx.fetch_certificates(&CertificateFilter::by_name(name))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| SwitchyardError::not_exist("Certificate", name))
}
