//! Shared validation helpers for manager requests

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

use crate::domain::BLACKHOLE;

lazy_static! {
    /// Names of products, clusters, sub-clusters, BFE clusters and
    /// certificates. No dots: a product name doubles as the pool name prefix.
    static ref NAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]{0,63}$")
        .expect("NAME_REGEX should be a valid regex pattern");
}

pub fn validate_entity_name(name: &str) -> Result<(), ValidationError> {
    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_name")
            .with_message("must be 1-64 characters of letters, digits, '-' or '_'".into()))
    }
}

/// Entity name that is also free to appear as an LB matrix column
pub fn validate_sub_cluster_name(name: &str) -> Result<(), ValidationError> {
    validate_entity_name(name)?;
    if name == BLACKHOLE {
        return Err(ValidationError::new("reserved_name")
            .with_message("is reserved for the LB matrix sink".into()));
    }
    Ok(())
}

pub fn validate_email_list(list: &Vec<String>) -> Result<(), ValidationError> {
    if list.iter().all(|entry| entry.contains('@') && !entry.trim().is_empty()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_mail_list")
            .with_message("every entry must be an email address".into()))
    }
}

pub fn validate_hostname(name: &str) -> Result<(), ValidationError> {
    if crate::domain::hostname::is_valid_hostname(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_hostname")
            .with_message("must be a hostname, optionally prefixed with '*.'".into()))
    }
}
