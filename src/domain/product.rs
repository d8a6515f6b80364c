//! Product (tenant) domain types

use super::id::ProductId;
use serde::{Deserialize, Serialize};

/// Identifier of the built-in infrastructure product
pub const BUILTIN_PRODUCT_ID: ProductId = ProductId::new(1);

/// Name of the built-in infrastructure product; also the prefix of its pools
pub const BUILTIN_PRODUCT_NAME: &str = "BFE";

/// Tenant boundary. Every cluster, sub-cluster, pool, domain and route rule
/// belongs to exactly one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub mail_list: Vec<String>,
    pub contact: Vec<String>,
}

impl Product {
    /// The reserved product that owns the load balancer's own pools
    pub fn is_builtin(&self) -> bool {
        self.id == BUILTIN_PRODUCT_ID
    }

    /// Default built-in product row, seeded by every store
    pub fn builtin() -> Self {
        Self {
            id: BUILTIN_PRODUCT_ID,
            name: BUILTIN_PRODUCT_NAME.to_string(),
            description: "load balancer infrastructure".to_string(),
            mail_list: vec![],
            contact: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin() {
        let product = Product::builtin();
        assert!(product.is_builtin());
        assert_eq!(product.name, "BFE");

        let tenant = Product { id: ProductId::new(2), name: "shop".to_string(), ..product };
        assert!(!tenant.is_builtin());
    }
}
