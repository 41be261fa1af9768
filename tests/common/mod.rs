//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use entitlement_engine::{
    CatalogError, Category, EngineConfig, Manager, NetworkMonitor, PlatformError, Product,
    ProductCatalog, ProductId, PurchaseOption, PurchasePlatform, PurchaseResult, RawTransaction,
    Timestamp, TransactionId,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory purchase platform driven by the test.
pub struct ScriptedPlatform {
    updates_tx: Sender<RawTransaction>,
    updates_rx: Receiver<RawTransaction>,
    pub subscriptions: AtomicUsize,
    pub unfinished: Mutex<Vec<RawTransaction>>,
    pub finish_calls: Mutex<Vec<TransactionId>>,
    /// Transactions whose next finish call fails.
    pub failing_finish: Mutex<HashSet<TransactionId>>,
    pub purchase_results: Mutex<VecDeque<Result<PurchaseResult, PlatformError>>>,
    /// Delivered on the update stream while the purchase sheet is open,
    /// stamped with the delivery time. The sheet closes only after the engine
    /// has finished each of them.
    pub during_purchase: Mutex<Vec<RawTransaction>>,
    pub sync_result: Mutex<Result<(), PlatformError>>,
    pub current: Mutex<Vec<RawTransaction>>,
    pub sync_calls: AtomicUsize,
}

impl ScriptedPlatform {
    pub fn new() -> Arc<Self> {
        let (updates_tx, updates_rx) = unbounded();
        Arc::new(Self {
            updates_tx,
            updates_rx,
            subscriptions: AtomicUsize::new(0),
            unfinished: Mutex::new(Vec::new()),
            finish_calls: Mutex::new(Vec::new()),
            failing_finish: Mutex::new(HashSet::new()),
            purchase_results: Mutex::new(VecDeque::new()),
            during_purchase: Mutex::new(Vec::new()),
            sync_result: Mutex::new(Ok(())),
            current: Mutex::new(Vec::new()),
            sync_calls: AtomicUsize::new(0),
        })
    }

    /// Push a transaction onto the live update stream.
    pub fn deliver(&self, tx: RawTransaction) {
        self.updates_tx.send(tx).unwrap();
    }

    pub fn script_purchase(&self, result: Result<PurchaseResult, PlatformError>) {
        self.purchase_results.lock().push_back(result);
    }

    pub fn finish_count(&self, id: u64) -> usize {
        self.finish_calls
            .lock()
            .iter()
            .filter(|t| t.0 == id)
            .count()
    }
}

impl PurchasePlatform for ScriptedPlatform {
    fn unfinished_transactions(&self) -> Result<Vec<RawTransaction>, PlatformError> {
        Ok(self.unfinished.lock().clone())
    }

    fn transaction_updates(&self) -> Receiver<RawTransaction> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.updates_rx.clone()
    }

    fn finish(&self, id: TransactionId) -> Result<(), PlatformError> {
        self.finish_calls.lock().push(id);
        if self.failing_finish.lock().remove(&id) {
            return Err(PlatformError::Network("finish timed out".into()));
        }
        Ok(())
    }

    fn purchase(&self, _product: &Product) -> Result<PurchaseResult, PlatformError> {
        let arriving: Vec<RawTransaction> = self.during_purchase.lock().drain(..).collect();
        for mut tx in arriving {
            tx.purchased_at = Timestamp::now();
            let id = tx.id.0;
            self.deliver(tx);
            wait_until(|| self.finish_count(id) > 0);
        }
        self.purchase_results
            .lock()
            .pop_front()
            .unwrap_or(Ok(PurchaseResult::UserCancelled))
    }

    fn sync(&self) -> Result<(), PlatformError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        self.sync_result.lock().clone()
    }

    fn current_entitlements(&self) -> Result<Vec<RawTransaction>, PlatformError> {
        Ok(self.current.lock().clone())
    }
}

/// Catalog that knows a fixed set of products.
pub struct StaticCatalog {
    pub products: HashMap<ProductId, Product>,
    pub offline: AtomicBool,
}

impl StaticCatalog {
    pub fn for_options(options: &[PurchaseOption]) -> Arc<Self> {
        let products = options
            .iter()
            .map(|o| {
                (
                    o.product_id.clone(),
                    Product::new(o.product_id.as_str(), o.id.as_str(), "$4.99"),
                )
            })
            .collect();
        Arc::new(Self {
            products,
            offline: AtomicBool::new(false),
        })
    }
}

impl ProductCatalog for StaticCatalog {
    fn load_products(
        &self,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, CatalogError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CatalogError::Network("offline".into()));
        }
        Ok(product_ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}

/// Network signal the test flips by hand.
pub struct ToggleNetwork(pub AtomicBool);

impl ToggleNetwork {
    pub fn new(allowed: bool) -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(allowed)))
    }

    pub fn set(&self, allowed: bool) {
        self.0.store(allowed, Ordering::SeqCst);
    }
}

impl NetworkMonitor for ToggleNetwork {
    fn operations_allowed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// --- Fixtures ---

pub fn monthly() -> PurchaseOption {
    PurchaseOption::new("monthly", "pro.monthly", Category::AutoRenewableSubscription, "pro", 0)
}

pub fn yearly() -> PurchaseOption {
    PurchaseOption::new("yearly", "pro.yearly", Category::AutoRenewableSubscription, "pro", 1)
}

pub fn lifetime() -> PurchaseOption {
    PurchaseOption::new("lifetime", "app.lifetime", Category::NonConsumable, "unlock", 2)
}

pub fn all_options() -> Vec<PurchaseOption> {
    vec![monthly(), yearly(), lifetime()]
}

pub fn subscription_tx(id: u64, option: &PurchaseOption, days: i64) -> RawTransaction {
    RawTransaction::verified(id, option.product_id.as_str()).with_expiry(Timestamp::now().add_days(days))
}

/// Route engine logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn manager_with(
    platform: &Arc<ScriptedPlatform>,
    network: Option<Arc<ToggleNetwork>>,
    config: EngineConfig,
) -> Manager {
    init_tracing();
    let catalog = StaticCatalog::for_options(&all_options());
    let network = network.map(|n| n as Arc<dyn NetworkMonitor>);
    Manager::new(platform.clone(), catalog, network, config).unwrap()
}

pub fn manager(platform: &Arc<ScriptedPlatform>) -> Manager {
    manager_with(platform, None, EngineConfig::default())
}

/// Poll until `cond` holds or two seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
