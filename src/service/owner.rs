//! Owner actor holding all mutable engine state.
//!
//! Every mutation of the registry, snapshot, flow state, and finish ledger
//! happens on this thread, one [`Command`] at a time.

use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::flow::{FlowState, FlowTrigger};
use crate::platform::PurchasePlatform;
use crate::registry::OptionRegistry;
use crate::state::{classify, enforce_exclusivity, reduce, EntitlementSnapshot, EntitlementState};
use crate::types::{
    ProductId, PurchaseOption, RawTransaction, Timestamp, TransactionId, Verification,
};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters describing what the pipeline has seen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Transactions that changed or confirmed an entitlement.
    pub processed: u64,
    /// Redeliveries of already-finished transactions.
    pub redelivered: u64,
    pub unverified_discarded: u64,
    /// Transactions for products no configured option sells.
    pub unmapped: u64,
    pub finished: u64,
    pub finish_failures: u64,
    /// Finished ids currently remembered for redelivery detection.
    pub finish_ledger: u64,
}

/// Result of running one transaction through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Ingested {
    Applied(EntitlementState),
    Unverified(String),
    Unmapped,
}

pub(crate) enum Command {
    Configure {
        options: Vec<PurchaseOption>,
        reply: Sender<Result<EntitlementSnapshot>>,
    },
    /// A fact from the listener.
    Transaction(RawTransaction),
    /// The platform returned a transaction directly from a purchase call.
    PurchaseCompleted {
        tx: RawTransaction,
        reply: Sender<Ingested>,
    },
    /// Full re-derivation for `options` from the current-entitlements source.
    ApplyCurrent {
        options: Vec<PurchaseOption>,
        facts: Vec<RawTransaction>,
        reply: Sender<EntitlementSnapshot>,
    },
    /// Marks the start of a purchase; replies with the start time a later
    /// deferral correlates approvals against.
    BeginPurchase {
        option: PurchaseOption,
        reply: Sender<Option<Timestamp>>,
    },
    Deferred {
        product_id: ProductId,
        since: Timestamp,
        waiter: Sender<EntitlementState>,
        done: Sender<()>,
    },
    Flow {
        trigger: FlowTrigger,
        done: Sender<()>,
    },
    Snapshot {
        reply: Sender<EntitlementSnapshot>,
    },
    Stats {
        reply: Sender<EngineStats>,
    },
    Publish {
        event: EngineEvent,
        done: Sender<()>,
    },
    Shutdown,
}

pub(crate) struct Owner {
    platform: Arc<dyn PurchasePlatform>,
    bus: Arc<EventBus>,
    registry: OptionRegistry,
    snapshot: EntitlementSnapshot,
    flow: FlowState,
    /// Transactions acknowledged to the platform. Pruned to the current
    /// entitlement set on every full reconciliation.
    finished: HashSet<TransactionId>,
    /// Deferred purchases by product with their purchase start; an entry
    /// outlives dropped waiters so the flow state still resolves.
    deferred: HashMap<ProductId, Vec<(Timestamp, Sender<EntitlementState>)>>,
    /// Purchase time and published state of the newest first-delivery,
    /// unlapsed transaction per product.
    approvals: HashMap<ProductId, (Timestamp, EntitlementState)>,
    stats: EngineStats,
}

impl Owner {
    pub(crate) fn new(platform: Arc<dyn PurchasePlatform>, bus: Arc<EventBus>) -> Self {
        Self {
            platform,
            bus,
            registry: OptionRegistry::new(),
            snapshot: EntitlementSnapshot::new(),
            flow: FlowState::Idle,
            finished: HashSet::new(),
            deferred: HashMap::new(),
            approvals: HashMap::new(),
            stats: EngineStats::default(),
        }
    }

    /// Process commands until shutdown or until every sender is gone.
    pub(crate) fn run(mut self, mailbox: Receiver<Command>) {
        while let Ok(command) = mailbox.recv() {
            if !self.handle(command) {
                break;
            }
        }
        debug!("entitlement owner stopped");
    }

    /// Returns false when the actor should stop.
    pub(crate) fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Configure { options, reply } => {
                let _ = reply.send(self.configure(options));
            }
            Command::Transaction(tx) => {
                self.ingest(tx);
            }
            Command::PurchaseCompleted { tx, reply } => {
                let outcome = self.ingest(tx);
                let trigger = match &outcome {
                    Ingested::Applied(_) => FlowTrigger::Completed,
                    Ingested::Unverified(reason) => FlowTrigger::Failed(reason.clone()),
                    Ingested::Unmapped => {
                        FlowTrigger::Failed("purchase returned an unknown product".into())
                    }
                };
                self.transition(trigger);
                let _ = reply.send(outcome);
            }
            Command::ApplyCurrent {
                options,
                facts,
                reply,
            } => {
                let _ = reply.send(self.apply_current(&options, facts));
            }
            Command::BeginPurchase { option, reply } => {
                if self.registry.contains(&option) {
                    self.transition(FlowTrigger::Started);
                    let _ = reply.send(Some(Timestamp::now()));
                } else {
                    let _ = reply.send(None);
                }
            }
            Command::Deferred {
                product_id,
                since,
                waiter,
                done,
            } => {
                self.defer(product_id, since, waiter);
                let _ = done.send(());
            }
            Command::Flow { trigger, done } => {
                self.transition(trigger);
                let _ = done.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot.clone());
            }
            Command::Stats { reply } => {
                self.stats.finish_ledger = self.finished.len() as u64;
                let _ = reply.send(self.stats.clone());
            }
            Command::Publish { event, done } => {
                self.bus.publish(event);
                let _ = done.send(());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn configure(&mut self, options: Vec<PurchaseOption>) -> Result<EntitlementSnapshot> {
        self.registry
            .register(options.clone())
            .map_err(EngineError::from)?;

        let mut next = self.snapshot.reconfigured(&options);
        enforce_exclusivity(&mut next);
        info!(options = options.len(), "configured purchasable options");
        self.publish_snapshot(next, true);
        Ok(self.snapshot.clone())
    }

    /// Verify, map, classify, finish, emit.
    pub(crate) fn ingest(&mut self, tx: RawTransaction) -> Ingested {
        if let Verification::Unverified { reason } = self.platform.verify(&tx) {
            warn!(
                transaction_id = %tx.id,
                product_id = %tx.product_id,
                %reason,
                "discarding unverified transaction"
            );
            self.stats.unverified_discarded += 1;
            return Ingested::Unverified(reason);
        }

        let option = match self.registry.lookup(&tx.product_id) {
            Some(option) => option.clone(),
            None => {
                debug!(transaction_id = %tx.id, product_id = %tx.product_id, "finishing transaction for unknown product");
                self.stats.unmapped += 1;
                self.finish_once(tx.id);
                return Ingested::Unmapped;
            }
        };

        let state = classify(option.category, &tx, Timestamp::now());
        let first_delivery = !self.finished.contains(&tx.id);
        self.finish_once(tx.id);

        let approves = first_delivery && can_approve(&state);
        let next = reduce(&self.snapshot, &[(option.clone(), state)]);
        let published = next.state(&option);
        self.stats.processed += 1;
        if approves {
            let newer = self
                .approvals
                .get(&tx.product_id)
                .map_or(true, |(seen, _)| tx.purchased_at >= *seen);
            if newer {
                self.approvals
                    .insert(tx.product_id.clone(), (tx.purchased_at, published.clone()));
            }
        }

        debug!(
            transaction_id = %tx.id,
            option_id = %option.id,
            active = published.is_active(),
            "reconciled transaction"
        );
        self.bus.publish(EngineEvent::EntitlementUpdated {
            option,
            state: published.clone(),
        });
        self.publish_snapshot(next, false);
        if approves {
            self.resolve_deferred(&tx.product_id, tx.purchased_at, &published);
        }

        Ingested::Applied(published)
    }

    /// Acknowledge a transaction unless it already was. Failures are retried
    /// on the next delivery.
    fn finish_once(&mut self, id: TransactionId) {
        if self.finished.contains(&id) {
            self.stats.redelivered += 1;
            return;
        }
        match self.platform.finish(id) {
            Ok(()) => {
                self.finished.insert(id);
                self.stats.finished += 1;
            }
            Err(e) => {
                warn!(transaction_id = %id, error = %e, "finish failed; will retry on redelivery");
                self.stats.finish_failures += 1;
            }
        }
    }

    fn apply_current(
        &mut self,
        options: &[PurchaseOption],
        facts: Vec<RawTransaction>,
    ) -> EntitlementSnapshot {
        let now = Timestamp::now();
        let mut latest: HashMap<ProductId, RawTransaction> = HashMap::new();

        // The platform only redelivers what it still reports; older finished
        // ids can be forgotten.
        let reported: HashSet<TransactionId> = facts.iter().map(|tx| tx.id).collect();
        let before = self.finished.len();
        self.finished.retain(|id| reported.contains(id));
        if self.finished.len() < before {
            debug!(pruned = before - self.finished.len(), "pruned finish ledger");
        }

        for tx in facts {
            if let Verification::Unverified { reason } = self.platform.verify(&tx) {
                warn!(transaction_id = %tx.id, %reason, "ignoring unverified current entitlement");
                self.stats.unverified_discarded += 1;
                continue;
            }
            let newer = latest.get(&tx.product_id).map_or(true, |seen| {
                (tx.purchased_at, tx.id) > (seen.purchased_at, seen.id)
            });
            if newer {
                latest.insert(tx.product_id.clone(), tx);
            }
        }

        let incoming: Vec<(PurchaseOption, EntitlementState)> = options
            .iter()
            .filter(|option| self.registry.contains(option))
            .map(|option| {
                let state = latest
                    .get(&option.product_id)
                    .map(|tx| classify(option.category, tx, now))
                    .unwrap_or(EntitlementState::Inactive);
                (option.clone(), state)
            })
            .collect();

        let next = reduce(&self.snapshot, &incoming);
        self.publish_snapshot(next, true);

        for (option, classified) in &incoming {
            if let Some(tx) = latest.get(&option.product_id) {
                if can_approve(classified) {
                    let state = self.snapshot.state(option);
                    self.resolve_deferred(&option.product_id, tx.purchased_at, &state);
                }
            }
        }

        self.snapshot.clone()
    }

    fn defer(&mut self, product_id: ProductId, since: Timestamp, waiter: Sender<EntitlementState>) {
        // The approval may have been applied while the purchase call was
        // still returning.
        if let Some((purchased_at, state)) = self.approvals.get(&product_id) {
            if *purchased_at >= since {
                debug!(product_id = %product_id, "deferred purchase already approved");
                let _ = waiter.send(state.clone());
                self.transition(FlowTrigger::Completed);
                return;
            }
        }
        self.transition(FlowTrigger::Deferred);
        self.deferred
            .entry(product_id)
            .or_default()
            .push((since, waiter));
    }

    /// Hand `state` to every deferral of `product_id` that started no later
    /// than `purchased_at`.
    fn resolve_deferred(
        &mut self,
        product_id: &ProductId,
        purchased_at: Timestamp,
        state: &EntitlementState,
    ) {
        let Some(waiters) = self.deferred.remove(product_id) else {
            return;
        };
        let (resolved, waiting): (Vec<_>, Vec<_>) = waiters
            .into_iter()
            .partition(|(since, _)| *since <= purchased_at);

        if !waiting.is_empty() {
            self.deferred.insert(product_id.clone(), waiting);
        }
        if resolved.is_empty() {
            return;
        }

        info!(product_id = %product_id, count = resolved.len(), "deferred purchase resolved");
        for (_, waiter) in resolved {
            let _ = waiter.send(state.clone());
        }
        if self.deferred.is_empty() {
            self.transition(FlowTrigger::Resolved);
        }
    }

    fn transition(&mut self, trigger: FlowTrigger) {
        let next = self.flow.apply(trigger);
        if next != self.flow {
            self.flow = next.clone();
            self.bus.publish(EngineEvent::FlowChanged { state: next });
        }
    }

    /// Replace the snapshot and notify; unchanged snapshots are only
    /// announced when `force` is set.
    fn publish_snapshot(&mut self, next: EntitlementSnapshot, force: bool) {
        if !force && next == self.snapshot {
            return;
        }
        self.snapshot = next;
        self.bus.publish(EngineEvent::SnapshotChanged {
            entries: self.snapshot.sorted(),
        });
    }
}

/// Whether a freshly classified fact can be the approval of a deferred
/// purchase. A lapsed subscription never is.
fn can_approve(state: &EntitlementState) -> bool {
    !matches!(state, EntitlementState::SubscriptionExpired { .. })
}
