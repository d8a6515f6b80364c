//! Backend instance pool domain types
//!
//! A pool is a named collection of backend instances. Names are namespaced as
//! `<owner>.<suffix>`, where the owner is either the built-in product (an
//! infrastructure pool serving the load balancer itself) or a tenant product.

use super::id::{PoolId, ProductId};
use crate::errors::{Result, SwitchyardError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Separator between the owner prefix and the pool suffix
pub const POOL_NAME_SEPARATOR: char = '.';

/// Port name used when an instance exposes a single port
pub const DEFAULT_PORT_NAME: &str = "Default";

/// Who a pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolTag {
    /// Instances of the load balancer fleet itself
    Bfe,
    /// Backend instances of a tenant product
    Product,
}

impl PoolTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolTag::Bfe => "bfe",
            PoolTag::Product => "product",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bfe" => Some(PoolTag::Bfe),
            "product" => Some(PoolTag::Product),
            _ => None,
        }
    }
}

/// Which strategy supplies a pool's instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    /// Operator-maintained instance list
    Static,
    /// Instances synced from an external service registry
    Registry,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Static => "static",
            PoolType::Registry => "registry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "static" => Some(PoolType::Static),
            "registry" => Some(PoolType::Registry),
            _ => None,
        }
    }
}

/// A single backend instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub hostname: String,
    pub ip: String,
    pub weight: i32,
    /// Port per protocol name, e.g. `Default`, `Http`, `Https`
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Instance {
    /// Port used for proxied traffic
    pub fn default_port(&self) -> Option<u16> {
        self.ports.get(DEFAULT_PORT_NAME).or_else(|| self.ports.values().next()).copied()
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(SwitchyardError::param_field(
                "Instance hostname cannot be empty",
                "hostname",
            ));
        }

        if self.ip.parse::<IpAddr>().is_err() {
            return Err(SwitchyardError::param_field(
                format!("Instance '{}' has invalid IP '{}'", self.hostname, self.ip),
                "ip",
            ));
        }

        if self.weight < 0 {
            return Err(SwitchyardError::param_field(
                format!("Instance '{}' weight must be >= 0", self.hostname),
                "weight",
            ));
        }

        if self.ports.is_empty() {
            return Err(SwitchyardError::param_field(
                format!("Instance '{}' must expose at least one port", self.hostname),
                "ports",
            ));
        }

        if let Some((name, _)) = self.ports.iter().find(|(_, port)| **port == 0) {
            return Err(SwitchyardError::param_field(
                format!("Instance '{}' port '{}' must be between 1 and 65535", self.hostname, name),
                "ports",
            ));
        }

        Ok(())
    }
}

/// Named collection of backend instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub name: String,
    pub product_id: ProductId,
    pub tag: PoolTag,
    pub pool_type: PoolType,
    pub instances: Vec<Instance>,
}

impl Pool {
    /// Infrastructure pools may be bound by any product's sub-clusters
    pub fn is_infrastructure(&self) -> bool {
        self.tag == PoolTag::Bfe
    }

    /// Static pools are always ready; registry pools once the registry has
    /// delivered at least one routable instance.
    pub fn ready(&self) -> bool {
        match self.pool_type {
            PoolType::Static => true,
            PoolType::Registry => self.instances.iter().any(|i| i.weight > 0),
        }
    }
}

/// Qualify a caller-supplied pool name with its owner prefix.
///
/// A name already carrying `<owner>.` is used verbatim; a name carrying any
/// other prefix is rejected; a bare name gets the prefix prepended.
pub fn qualify_pool_name(owner: &str, name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(SwitchyardError::param_field("Pool name cannot be empty", "name"));
    }

    match name.split_once(POOL_NAME_SEPARATOR) {
        Some((prefix, suffix)) => {
            if prefix != owner {
                return Err(SwitchyardError::param_field(
                    format!("Pool name '{}' must be prefixed with '{}.'", name, owner),
                    "name",
                ));
            }
            if suffix.is_empty() {
                return Err(SwitchyardError::param_field(
                    format!("Pool name '{}' has an empty suffix", name),
                    "name",
                ));
            }
            Ok(name.to_string())
        }
        None => Ok(format!("{}{}{}", owner, POOL_NAME_SEPARATOR, name)),
    }
}
