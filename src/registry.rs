//! Registry of configured purchasable options.

use crate::error::ConfigurationError;
use crate::types::{ProductId, PurchaseOption};
use std::collections::HashMap;

/// Lookup table from platform product id to the configured option.
#[derive(Clone, Debug, Default)]
pub struct OptionRegistry {
    options: Vec<PurchaseOption>,
    by_product: HashMap<ProductId, PurchaseOption>,
}

impl OptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active option set.
    ///
    /// Fails without modifying the registry if two options share a product
    /// id.
    pub fn register(&mut self, options: Vec<PurchaseOption>) -> Result<(), ConfigurationError> {
        let mut by_product: HashMap<ProductId, PurchaseOption> = HashMap::with_capacity(options.len());

        for option in &options {
            if let Some(existing) = by_product.get(&option.product_id) {
                return Err(ConfigurationError::DuplicateProductId {
                    product_id: option.product_id.clone(),
                    first: existing.id.clone(),
                    second: option.id.clone(),
                });
            }
            by_product.insert(option.product_id.clone(), option.clone());
        }

        self.options = options;
        self.by_product = by_product;
        Ok(())
    }

    pub fn lookup(&self, product_id: &ProductId) -> Option<&PurchaseOption> {
        self.by_product.get(product_id)
    }

    pub fn contains(&self, option: &PurchaseOption) -> bool {
        self.by_product
            .get(&option.product_id)
            .map_or(false, |registered| registered == option)
    }

    pub fn options(&self) -> &[PurchaseOption] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}
