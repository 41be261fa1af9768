//! Interfaces of the external collaborators the engine drives.
//!
//! The purchase platform is the system of record. The engine only consumes
//! what these traits expose and never caches anything it cannot recompute
//! from them.

use crate::error::{CatalogError, PlatformError};
use crate::types::{Product, ProductId, RawTransaction, TransactionId, Verification};
use crossbeam_channel::Receiver;
use std::collections::HashMap;

/// Immediate result of the platform purchase sheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseResult {
    Success(RawTransaction),
    UserCancelled,
    /// Ask-to-buy or otherwise deferred; a transaction may arrive later.
    Pending,
}

/// The vendor purchase platform SDK.
pub trait PurchasePlatform: Send + Sync + 'static {
    /// Transactions delivered earlier but never finished.
    fn unfinished_transactions(&self) -> Result<Vec<RawTransaction>, PlatformError>;

    /// Subscribe to live transaction updates.
    ///
    /// Dropping the receiver unsubscribes.
    fn transaction_updates(&self) -> Receiver<RawTransaction>;

    /// Cryptographic check of a transaction.
    fn verify(&self, tx: &RawTransaction) -> Verification {
        tx.verification.clone()
    }

    /// Acknowledge a transaction so the platform stops redelivering it.
    fn finish(&self, id: TransactionId) -> Result<(), PlatformError>;

    /// Present the purchase sheet for `product`. Blocks until the user and
    /// platform are done.
    fn purchase(&self, product: &Product) -> Result<PurchaseResult, PlatformError>;

    /// Sync purchases with the platform account (user-facing restore).
    fn sync(&self) -> Result<(), PlatformError>;

    /// Latest transaction for every product the user is currently entitled to.
    fn current_entitlements(&self) -> Result<Vec<RawTransaction>, PlatformError>;
}

/// Product metadata loader.
pub trait ProductCatalog: Send + Sync + 'static {
    fn load_products(
        &self,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, CatalogError>;
}

/// Network-awareness signal.
pub trait NetworkMonitor: Send + Sync + 'static {
    fn operations_allowed(&self) -> bool;
}
