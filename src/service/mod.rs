//! Transaction service: listener lifecycle, purchase, restore, refresh.
//!
//! The service owns two threads:
//! - the owner actor, which holds all mutable state and applies one command
//!   at a time
//! - the listener, which only forwards platform transactions to the owner
//!
//! Purchase and restore run on the calling thread and talk to the owner
//! through its mailbox, so a caller abandoning a call never affects the
//! listener or leaves a transaction unfinished.

mod listener;
mod owner;

pub use listener::ListenerState;
pub use owner::EngineStats;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::flow::FlowTrigger;
use crate::platform::{NetworkMonitor, PurchasePlatform, PurchaseResult};
use crate::state::{EntitlementSnapshot, EntitlementState};
use crate::types::{Product, ProductId, PurchaseOption, TransactionId};
use crossbeam_channel::{bounded, Receiver, Sender};
use listener::Listener;
use owner::{Command, Ingested, Owner};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a purchase call.
#[derive(Debug)]
pub enum PurchaseOutcome {
    /// The platform completed the purchase and the transaction was reconciled.
    Purchased {
        transaction_id: TransactionId,
        state: EntitlementState,
    },
    /// The user dismissed the purchase sheet.
    UserCancelled,
    /// The purchase awaits approval; the handle resolves when it arrives.
    Pending(DeferredPurchase),
}

/// Result of a passive refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(EntitlementSnapshot),
    /// Network operations are disallowed right now.
    Skipped,
}

/// Wait handle for a deferred (ask-to-buy) purchase.
///
/// Dropping it only abandons the wait; the transaction is still processed
/// when it arrives.
#[derive(Debug)]
pub struct DeferredPurchase {
    product_id: ProductId,
    receiver: Receiver<EntitlementState>,
}

impl DeferredPurchase {
    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// Block until the deferred transaction is reconciled.
    pub fn wait(&self) -> Result<EntitlementState> {
        self.receiver.recv().map_err(|_| EngineError::Shutdown)
    }

    /// `Ok(None)` when nothing arrived within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<EntitlementState>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(state) => Ok(Some(state)),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Ok(None),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(EngineError::Shutdown),
        }
    }

    pub fn try_resolve(&self) -> Option<EntitlementState> {
        self.receiver.try_recv().ok()
    }
}

/// Reconciles platform transactions into the entitlement snapshot.
pub struct TransactionService {
    platform: Arc<dyn PurchasePlatform>,
    network: Option<Arc<dyn NetworkMonitor>>,
    bus: Arc<EventBus>,
    mailbox: Sender<Command>,
    owner: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<Listener>>,
}

impl TransactionService {
    /// Spawn the owner actor. The listener is not started.
    pub fn new(
        platform: Arc<dyn PurchasePlatform>,
        bus: Arc<EventBus>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let (mailbox, inbox) = bounded(config.mailbox_capacity.max(1));
        let owner = Owner::new(Arc::clone(&platform), Arc::clone(&bus));
        let handle = thread::Builder::new()
            .name("entitlement-owner".into())
            .spawn(move || owner.run(inbox))
            .map_err(|e| EngineError::System(format!("failed to spawn owner: {}", e)))?;

        Ok(Self {
            platform,
            network: None,
            bus,
            mailbox,
            owner: Mutex::new(Some(handle)),
            listener: Mutex::new(None),
        })
    }

    /// Gate passive refreshes on a network signal.
    pub fn with_network(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // --- Listener Lifecycle ---

    /// Attach to the platform update stream. No-op while already listening.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.listener.lock();
        if let Some(existing) = slot.as_ref() {
            if !existing.is_finished() {
                debug!("listener already running");
                return Ok(());
            }
            if let Some(stale) = slot.take() {
                stale.stop();
            }
        }

        *slot = Some(Listener::spawn(
            Arc::clone(&self.platform),
            self.mailbox.clone(),
        )?);
        drop(slot);
        info!("transaction listener started");
        self.publish(EngineEvent::ListenerStarted)
    }

    /// Detach from the update stream. Idempotent.
    pub fn stop(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.stop();
            info!("transaction listener stopped");
            let _ = self.publish(EngineEvent::ListenerStopped);
        }
    }

    pub fn listener_state(&self) -> ListenerState {
        match self.listener.lock().as_ref() {
            Some(l) if !l.is_finished() => ListenerState::Listening,
            _ => ListenerState::Idle,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener_state() == ListenerState::Listening
    }

    // --- Owner Requests ---

    /// Replace the option set. Known active entitlements of options that
    /// remain are kept; everything else starts `Inactive`.
    pub fn configure(&self, options: Vec<PurchaseOption>) -> Result<EntitlementSnapshot> {
        self.request(|reply| Command::Configure { options, reply })?
    }

    pub fn snapshot(&self) -> Result<EntitlementSnapshot> {
        self.request(|reply| Command::Snapshot { reply })
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.request(|reply| Command::Stats { reply })
    }

    /// Publish an event through the owner so it is ordered with state
    /// changes. Returns after every sink has seen it.
    pub fn publish(&self, event: EngineEvent) -> Result<()> {
        self.request(|done| Command::Publish { event, done })
    }

    // --- Operations ---

    /// Run the platform purchase sheet for `option`.
    ///
    /// Returns once the platform call completes. A cancelled sheet is not an
    /// error.
    pub fn purchase(&self, option: &PurchaseOption, product: &Product) -> Result<PurchaseOutcome> {
        if product.id != option.product_id {
            return Err(EngineError::ProductUnavailable(option.product_id.clone()));
        }

        let since = self
            .request(|reply| Command::BeginPurchase {
                option: option.clone(),
                reply,
            })?
            .ok_or_else(|| EngineError::ProductUnavailable(option.product_id.clone()))?;

        info!(option_id = %option.id, product_id = %product.id, "starting purchase");

        match self.platform.purchase(product) {
            Ok(PurchaseResult::Success(tx)) => {
                let transaction_id = tx.id;
                match self.request(|reply| Command::PurchaseCompleted { tx, reply })? {
                    Ingested::Applied(state) => Ok(PurchaseOutcome::Purchased {
                        transaction_id,
                        state,
                    }),
                    Ingested::Unverified(reason) => Err(EngineError::VerificationFailed(reason)),
                    Ingested::Unmapped => Err(EngineError::System(format!(
                        "purchase of {} returned a transaction for an unknown product",
                        option.product_id
                    ))),
                }
            }
            Ok(PurchaseResult::UserCancelled) => {
                debug!(option_id = %option.id, "purchase cancelled by user");
                self.transition(FlowTrigger::Cancelled)?;
                Ok(PurchaseOutcome::UserCancelled)
            }
            Ok(PurchaseResult::Pending) => {
                info!(option_id = %option.id, "purchase deferred");
                let (waiter, receiver) = bounded(1);
                self.request(|done| Command::Deferred {
                    product_id: option.product_id.clone(),
                    since,
                    waiter,
                    done,
                })?;
                Ok(PurchaseOutcome::Pending(DeferredPurchase {
                    product_id: option.product_id.clone(),
                    receiver,
                }))
            }
            Err(e) => {
                let err = EngineError::from(e);
                warn!(option_id = %option.id, error = %err, "purchase failed");
                self.transition(FlowTrigger::Failed(err.to_string()))?;
                Err(err)
            }
        }
    }

    /// Sync with the platform, then re-derive `options` from its current
    /// entitlements.
    ///
    /// Whatever the platform reports is applied even when the sync fails; the
    /// failure is still returned as `RestoreFailed`.
    pub fn restore_purchases(&self, options: &[PurchaseOption]) -> Result<EntitlementSnapshot> {
        self.transition(FlowTrigger::Started)?;

        let synced = self.platform.sync();
        if let Err(e) = &synced {
            warn!(error = %e, "platform sync failed during restore");
        }

        let facts = match self.platform.current_entitlements() {
            Ok(facts) => facts,
            Err(e) => {
                let reason = match synced {
                    Err(sync_err) => format!("{}; {}", sync_err, e),
                    Ok(()) => e.to_string(),
                };
                self.transition(FlowTrigger::Failed(reason.clone()))?;
                return Err(EngineError::RestoreFailed(reason));
            }
        };

        let snapshot = self.request(|reply| Command::ApplyCurrent {
            options: options.to_vec(),
            facts,
            reply,
        })?;

        match synced {
            Ok(()) => {
                info!(options = options.len(), "restore completed");
                self.transition(FlowTrigger::Completed)?;
                Ok(snapshot)
            }
            Err(e) => {
                let reason = e.to_string();
                self.transition(FlowTrigger::Failed(reason.clone()))?;
                Err(EngineError::RestoreFailed(reason))
            }
        }
    }

    /// Passive reconciliation from current entitlements, without a sync.
    pub fn process_current_entitlements(
        &self,
        options: &[PurchaseOption],
    ) -> Result<RefreshOutcome> {
        if let Some(network) = &self.network {
            if !network.operations_allowed() {
                debug!("skipping refresh while network operations are disallowed");
                return Ok(RefreshOutcome::Skipped);
            }
        }

        let facts = self.platform.current_entitlements()?;
        let snapshot = self.request(|reply| Command::ApplyCurrent {
            options: options.to_vec(),
            facts,
            reply,
        })?;
        Ok(RefreshOutcome::Refreshed(snapshot))
    }

    /// Stop the listener and the owner actor. Idempotent.
    pub fn shutdown(&self) {
        self.stop();
        let handle = self.owner.lock().take();
        if let Some(handle) = handle {
            let _ = self.mailbox.send(Command::Shutdown);
            if handle.join().is_err() {
                warn!("entitlement owner panicked");
            }
        }
    }

    fn transition(&self, trigger: FlowTrigger) -> Result<()> {
        self.request(|done| Command::Flow { trigger, done })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.mailbox.send(command).map_err(|_| EngineError::Shutdown)
    }

    fn request<T>(&self, build: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = bounded(1);
        self.send(build(reply))?;
        response.recv().map_err(|_| EngineError::Shutdown)
    }
}

impl Drop for TransactionService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
