//! Product hostnames and wildcard matching
//!
//! Hostnames are compared label by label from the right. A wildcard is only
//! allowed as the whole leftmost label and covers exactly one label, so
//! `*.example.com` matches `a.example.com` but not `a.b.example.com` or
//! `example.com`. A trailing root dot and letter case are ignored.

use super::id::{DomainId, ProductId};
use serde::{Deserialize, Serialize};

/// Hostname owned by a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    pub product_id: ProductId,
    /// Carries an HTTPS redirect policy outside route rules
    pub using_advanced_redirect: bool,
    /// Carries an HSTS policy outside route rules
    pub using_advanced_hsts: bool,
}

impl Domain {
    /// Whether TLS-only policies depend on this hostname independently of
    /// route rules
    pub fn used_by_tls_policy(&self) -> bool {
        self.using_advanced_redirect || self.using_advanced_hsts
    }
}

/// Lowercase and strip the trailing root dot
pub fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

pub fn is_wildcard(name: &str) -> bool {
    name.starts_with("*.")
}

/// Check if a domain follows basic formatting rules (with optional leading wildcard).
pub fn is_valid_hostname(name: &str) -> bool {
    let name = normalize(name);
    let to_check = name.strip_prefix("*.").unwrap_or(&name);

    if to_check.is_empty()
        || to_check.len() > 253
        || to_check.starts_with('.')
        || to_check.contains("..")
    {
        return false;
    }

    to_check.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Whether `pattern` covers `host`. Either side may be a wildcard; two
/// wildcards only match when they are identical.
pub fn matches(pattern: &str, host: &str) -> bool {
    let pattern = normalize(pattern);
    let host = normalize(host);

    let pattern_labels: Vec<&str> = pattern.rsplit('.').collect();
    let host_labels: Vec<&str> = host.rsplit('.').collect();
    if pattern_labels.len() != host_labels.len() {
        return false;
    }

    let last = pattern_labels.len() - 1;
    pattern_labels.iter().zip(&host_labels).enumerate().all(|(i, (p, h))| {
        if i == last && *p == "*" {
            true
        } else {
            p == h
        }
    })
}

/// Whether registering `candidate` would conflict with the already registered
/// `existing` name: identical names, a wildcard covering a literal, or a new
/// wildcard covering an existing literal.
pub fn conflicts(existing: &str, candidate: &str) -> bool {
    let existing_norm = normalize(existing);
    let candidate_norm = normalize(candidate);
    if existing_norm == candidate_norm {
        return true;
    }

    match (is_wildcard(&existing_norm), is_wildcard(&candidate_norm)) {
        (true, false) => matches(&existing_norm, &candidate_norm),
        (false, true) => matches(&candidate_norm, &existing_norm),
        _ => false,
    }
}
