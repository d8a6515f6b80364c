//! TLS server certificates

use super::id::CertificateId;
use serde::{Deserialize, Serialize};

/// Server certificate metadata. The PEM files themselves live on the data
/// plane hosts; only their paths are tracked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub cert_file_path: String,
    pub key_file_path: String,
    pub expired_date: String,
}
