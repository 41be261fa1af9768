//! Error types for the entitlement engine.

use crate::types::{OptionId, ProductId};
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(ProductId),

    #[error("Transaction verification failed: {0}")]
    VerificationFailed(String),

    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    #[error("System error: {0}")]
    System(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Engine has shut down")]
    Shutdown,
}

/// Errors raised while registering purchasable options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Duplicate product id {product_id} (options {first} and {second})")]
    DuplicateProductId {
        product_id: ProductId,
        first: OptionId,
        second: OptionId,
    },
}

/// Failures reported by the product catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("network error: {0}")]
    Network(String),

    #[error("products not found: {0:?}")]
    NotFound(Vec<ProductId>),
}

/// Failures reported by the purchase platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("network error: {0}")]
    Network(String),

    #[error("product not available on platform: {0}")]
    ProductUnavailable(ProductId),

    #[error("purchase not allowed: {0}")]
    NotAllowed(String),

    #[error("platform failure: {0}")]
    Failure(String),
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Network(msg) => EngineError::Network(msg),
            CatalogError::NotFound(ids) => match ids.into_iter().next() {
                Some(id) => EngineError::ProductUnavailable(id),
                None => EngineError::System("catalog reported an empty not-found set".into()),
            },
        }
    }
}

impl From<PlatformError> for EngineError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::Network(msg) => EngineError::Network(msg),
            PlatformError::ProductUnavailable(id) => EngineError::ProductUnavailable(id),
            PlatformError::NotAllowed(msg) => EngineError::System(msg),
            PlatformError::Failure(msg) => EngineError::System(msg),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvalidConfig(e.to_string())
    }
}

impl EngineError {
    /// Whether the caller may safely retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network(_) | EngineError::RestoreFailed(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_not_found_maps_to_product_unavailable() {
        let err: EngineError = CatalogError::NotFound(vec![ProductId::new("pro.monthly")]).into();
        assert!(matches!(err, EngineError::ProductUnavailable(ref id) if id.as_str() == "pro.monthly"));
    }

    #[test]
    fn test_network_errors_are_retryable() {
        let err: EngineError = PlatformError::Network("offline".into()).into();
        assert!(err.is_retryable());
        assert!(!EngineError::System("boom".into()).is_retryable());
    }
}
