//! `certificate` topic: default certificate and certificate file paths

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::Result;
use crate::services::Exporter;
use crate::storage::{CertificateFilter, StoreTx};

pub const CERTIFICATE_TOPIC: &str = "certificate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerCertFile {
    pub version: String,
    pub config: ServerCertConf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerCertConf {
    /// Empty while no certificate exists
    pub default: String,
    pub cert_conf: BTreeMap<String, CertFiles>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertFiles {
    pub server_cert_file: String,
    pub server_key_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocsp_response_file: Option<String>,
}

impl_versioned!(ServerCertFile);

#[derive(Debug, Default)]
pub struct ServerCertExporter;

#[async_trait]
impl Exporter for ServerCertExporter {
    type Payload = ServerCertFile;

    fn topic(&self) -> String {
        CERTIFICATE_TOPIC.to_string()
    }

    async fn generate(&self, tx: &mut dyn StoreTx) -> Result<ServerCertFile> {
        let certificates = tx.fetch_certificates(&CertificateFilter::default()).await?;

        let default = certificates
            .iter()
            .find(|c| c.is_default)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let cert_conf = certificates
            .into_iter()
            .map(|c| {
                let files = CertFiles {
                    server_cert_file: c.cert_file_path,
                    server_key_file: c.key_file_path,
                    ocsp_response_file: None,
                };
                (c.name, files)
            })
            .collect();

        Ok(ServerCertFile { version: String::new(), config: ServerCertConf { default, cert_conf } })
    }
}
