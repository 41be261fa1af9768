//! Facade wiring the engine to a presentation layer.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{
    DelegateSink, EngineDelegate, EngineEvent, EventBus, EventFilter, ObservedState,
    SubscriptionConfig, SubscriptionHandle,
};
use crate::flow::FlowState;
use crate::platform::{NetworkMonitor, ProductCatalog, PurchasePlatform};
use crate::service::{EngineStats, PurchaseOutcome, RefreshOutcome, TransactionService};
use crate::state::{EntitlementSnapshot, EntitlementState};
use crate::types::{Product, ProductId, PurchasableOption, PurchaseOption};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-facing entry point.
///
/// Reads (`snapshot`, `entitlement_state`, `flow_state`, `products`) come
/// from [`ObservedState`] and never block on the owner actor.
pub struct Manager {
    service: TransactionService,
    catalog: Arc<dyn ProductCatalog>,
    network: Option<Arc<dyn NetworkMonitor>>,
    observed: Arc<ObservedState>,
    options: RwLock<Vec<PurchaseOption>>,
    config: EngineConfig,
}

impl Manager {
    pub fn new(
        platform: Arc<dyn PurchasePlatform>,
        catalog: Arc<dyn ProductCatalog>,
        network: Option<Arc<dyn NetworkMonitor>>,
        config: EngineConfig,
    ) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let observed = Arc::new(ObservedState::new());
        bus.add_sink(observed.clone());

        let mut service = TransactionService::new(platform, bus, &config)?;
        if let Some(network) = &network {
            service = service.with_network(Arc::clone(network));
        }

        Ok(Self {
            service,
            catalog,
            network,
            observed,
            options: RwLock::new(Vec::new()),
            config,
        })
    }

    /// Start listening for transactions.
    pub fn start(&self) -> Result<()> {
        self.service.start()
    }

    pub fn stop(&self) {
        self.service.stop()
    }

    /// Register the host's purchasable options.
    pub fn configure<O: PurchasableOption>(&self, options: &[O]) -> Result<()> {
        let erased: Vec<PurchaseOption> = options.iter().map(|o| o.erase()).collect();
        self.service.configure(erased.clone())?;
        *self.options.write() = erased;

        if self.config.refresh_on_configure {
            if let Err(e) = self.refresh_purchases(None) {
                warn!(error = %e, "refresh after configure failed");
            }
        }
        Ok(())
    }

    pub fn options(&self) -> Vec<PurchaseOption> {
        self.options.read().clone()
    }

    /// Load product metadata for every configured option.
    pub fn load_products(&self) -> Result<Vec<Product>> {
        let options = self.options();
        let ids: Vec<ProductId> = options.iter().map(|o| o.product_id.clone()).collect();
        let loaded = self.catalog.load_products(&ids)?;

        let mut ordered = options.clone();
        ordered.sort_by_key(|o| o.ordering);
        let products: Vec<Product> = ordered
            .iter()
            .filter_map(|o| loaded.get(&o.product_id).cloned())
            .collect();

        debug!(requested = ids.len(), loaded = products.len(), "products loaded");
        self.service.publish(EngineEvent::ProductsLoaded {
            products: products.clone(),
        })?;
        Ok(products)
    }

    /// Purchase a configured option whose product has been loaded.
    pub fn purchase<O: PurchasableOption>(&self, option: &O) -> Result<PurchaseOutcome> {
        let option = option.erase();
        let product = self
            .observed
            .product(&option.product_id)
            .ok_or_else(|| EngineError::ProductUnavailable(option.product_id.clone()))?;
        self.service.purchase(&option, &product)
    }

    /// Restore `options`, or every configured option when `None`.
    pub fn restore_purchases(&self, options: Option<&[PurchaseOption]>) -> Result<EntitlementSnapshot> {
        let options = self.resolve_options(options);
        self.service.restore_purchases(&options)
    }

    /// Passive refresh of `options`, or every configured option when `None`.
    pub fn refresh_purchases(&self, options: Option<&[PurchaseOption]>) -> Result<RefreshOutcome> {
        let options = self.resolve_options(options);
        self.service.process_current_entitlements(&options)
    }

    /// Report a change of the network signal.
    pub fn network_changed(&self, allowed: bool) -> Result<()> {
        let previous = self.observed.network_allowed();
        self.service.publish(EngineEvent::NetworkChanged { allowed })?;

        let restored = allowed && previous != Some(true);
        if restored && self.config.refresh_on_network_restore && !self.options.read().is_empty() {
            match self.refresh_purchases(None) {
                Ok(RefreshOutcome::Skipped) => debug!("network restored but monitor still disallows"),
                Ok(RefreshOutcome::Refreshed(_)) => debug!("refreshed after network restore"),
                Err(e) => warn!(error = %e, "refresh after network restore failed"),
            }
        }
        Ok(())
    }

    pub fn network_allowed(&self) -> bool {
        self.network
            .as_ref()
            .map_or(true, |n| n.operations_allowed())
    }

    // --- Observable State ---

    pub fn entitlement_state<O: PurchasableOption>(&self, option: &O) -> EntitlementState {
        self.observed.entitlement_state(&option.erase())
    }

    pub fn is_entitled<O: PurchasableOption>(&self, option: &O) -> bool {
        self.observed.is_entitled(&option.erase())
    }

    pub fn snapshot(&self) -> EntitlementSnapshot {
        self.observed.snapshot()
    }

    pub fn flow_state(&self) -> FlowState {
        self.observed.flow_state()
    }

    pub fn products(&self) -> Vec<Product> {
        self.observed.products()
    }

    pub fn is_listening(&self) -> bool {
        self.service.is_listening()
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.service.stats()
    }

    // --- Event Consumers ---

    pub fn subscribe(&self, filter: EventFilter) -> SubscriptionHandle {
        self.service.bus().subscribe(SubscriptionConfig {
            buffer_size: self.config.event_buffer_size,
            filter,
        })
    }

    /// Attach a callback delegate. Callbacks run on the owner thread and
    /// must not call back into the manager synchronously.
    pub fn set_delegate<D: EngineDelegate + 'static>(&self, delegate: D) {
        self.service
            .bus()
            .add_sink(Arc::new(DelegateSink::new(delegate)));
    }

    pub fn shutdown(&self) {
        self.service.shutdown()
    }

    fn resolve_options(&self, options: Option<&[PurchaseOption]>) -> Vec<PurchaseOption> {
        match options {
            Some(options) => options.to_vec(),
            None => self.options(),
        }
    }
}
