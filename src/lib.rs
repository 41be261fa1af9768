//! # Entitlement Engine
//!
//! Turns a purchase platform's raw transaction stream into a consistent
//! entitlement snapshot and drives purchase and restore flows against it.
//!
//! ## Core Concepts
//!
//! - **Options**: host-defined purchasable items, erased to [`PurchaseOption`]
//! - **Entitlements**: per-option [`EntitlementState`] derived from the latest
//!   verified transaction
//! - **Exclusivity**: at most one active auto-renewable subscription per
//!   offering grouping ([`reduce`])
//! - **Flow**: the global purchase/restore progress signal ([`FlowState`])
//! - **Events**: every change is published on one [`EventBus`]
//!
//! ## Example
//!
//! ```ignore
//! use entitlement_engine::{Category, EngineConfig, Manager, PurchaseOption};
//!
//! let manager = Manager::new(platform, catalog, None, EngineConfig::default())?;
//! manager.start()?;
//!
//! let monthly = PurchaseOption::new("monthly", "pro.monthly", Category::AutoRenewableSubscription, "pro", 0);
//! let yearly = PurchaseOption::new("yearly", "pro.yearly", Category::AutoRenewableSubscription, "pro", 1);
//! manager.configure(&[monthly.clone(), yearly])?;
//!
//! manager.load_products()?;
//! manager.purchase(&monthly)?;
//!
//! if manager.is_entitled(&monthly) {
//!     // unlock
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod manager;
pub mod platform;
pub mod registry;
pub mod service;
pub mod state;
pub mod types;

// Re-exports
pub use config::EngineConfig;
pub use error::{CatalogError, ConfigurationError, EngineError, PlatformError, Result};
pub use events::{
    DelegateSink, DropReason, EngineDelegate, EngineEvent, EventBus, EventFilter, EventSink,
    ObservedState, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
pub use flow::{FlowState, FlowTrigger};
pub use manager::Manager;
pub use platform::{NetworkMonitor, ProductCatalog, PurchasePlatform, PurchaseResult};
pub use registry::OptionRegistry;
pub use service::{
    DeferredPurchase, EngineStats, ListenerState, PurchaseOutcome, RefreshOutcome,
    TransactionService,
};
pub use state::{classify, enforce_exclusivity, reduce, EntitlementSnapshot, EntitlementState, SnapshotEntry};
pub use types::*;
