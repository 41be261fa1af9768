//! Sinks that turn the event stream into observable state or callbacks.

use super::types::EngineEvent;
use crate::flow::FlowState;
use crate::state::{EntitlementSnapshot, EntitlementState, SnapshotEntry};
use crate::types::{Product, ProductId, PurchaseOption};
use parking_lot::RwLock;

/// Receives every published event inline on the publishing thread.
///
/// Implementations must not block.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &EngineEvent);
}

/// Callback interface for hosts that do not poll observable state.
///
/// All methods default to no-ops.
pub trait EngineDelegate: Send + Sync {
    fn entitlement_updated(&self, _option: &PurchaseOption, _state: &EntitlementState) {}

    fn entitlements_changed(&self, _entries: &[SnapshotEntry]) {}

    fn flow_changed(&self, _state: &FlowState) {}

    fn products_loaded(&self, _products: &[Product]) {}

    fn network_changed(&self, _allowed: bool) {}
}

/// Adapts an [`EngineDelegate`] to the bus.
pub struct DelegateSink<D> {
    delegate: D,
}

impl<D: EngineDelegate> DelegateSink<D> {
    pub fn new(delegate: D) -> Self {
        Self { delegate }
    }
}

impl<D: EngineDelegate> EventSink for DelegateSink<D> {
    fn handle(&self, event: &EngineEvent) {
        match event {
            EngineEvent::EntitlementUpdated { option, state } => {
                self.delegate.entitlement_updated(option, state)
            }
            EngineEvent::SnapshotChanged { entries } => self.delegate.entitlements_changed(entries),
            EngineEvent::FlowChanged { state } => self.delegate.flow_changed(state),
            EngineEvent::ProductsLoaded { products } => self.delegate.products_loaded(products),
            EngineEvent::NetworkChanged { allowed } => self.delegate.network_changed(*allowed),
            EngineEvent::ListenerStarted
            | EngineEvent::ListenerStopped
            | EngineEvent::Dropped { .. } => {}
        }
    }
}

/// Latest published values, readable from any thread.
#[derive(Default)]
pub struct ObservedState {
    snapshot: RwLock<EntitlementSnapshot>,
    flow: RwLock<FlowState>,
    products: RwLock<Vec<Product>>,
    network_allowed: RwLock<Option<bool>>,
    listening: RwLock<bool>,
}

impl ObservedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> EntitlementSnapshot {
        self.snapshot.read().clone()
    }

    pub fn entitlement_state(&self, option: &PurchaseOption) -> EntitlementState {
        self.snapshot.read().state(option)
    }

    pub fn is_entitled(&self, option: &PurchaseOption) -> bool {
        self.snapshot.read().is_entitled(option)
    }

    pub fn flow_state(&self) -> FlowState {
        self.flow.read().clone()
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.read().clone()
    }

    pub fn product(&self, id: &ProductId) -> Option<Product> {
        self.products.read().iter().find(|p| &p.id == id).cloned()
    }

    /// Last reported network signal, `None` until one arrives.
    pub fn network_allowed(&self) -> Option<bool> {
        *self.network_allowed.read()
    }

    pub fn is_listening(&self) -> bool {
        *self.listening.read()
    }
}

impl EventSink for ObservedState {
    fn handle(&self, event: &EngineEvent) {
        match event {
            EngineEvent::SnapshotChanged { entries } => {
                let mut snapshot = EntitlementSnapshot::new();
                for entry in entries {
                    snapshot.insert(entry.option.clone(), entry.state.clone());
                }
                *self.snapshot.write() = snapshot;
            }
            EngineEvent::EntitlementUpdated { option, state } => {
                let mut snapshot = self.snapshot.write();
                if snapshot.contains(option) {
                    snapshot.insert(option.clone(), state.clone());
                }
            }
            EngineEvent::FlowChanged { state } => *self.flow.write() = state.clone(),
            EngineEvent::ProductsLoaded { products } => *self.products.write() = products.clone(),
            EngineEvent::NetworkChanged { allowed } => *self.network_allowed.write() = Some(*allowed),
            EngineEvent::ListenerStarted => *self.listening.write() = true,
            EngineEvent::ListenerStopped => *self.listening.write() = false,
            EngineEvent::Dropped { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, TransactionId};
    use parking_lot::Mutex;

    fn lifetime() -> PurchaseOption {
        PurchaseOption::new("lifetime", "app.lifetime", Category::NonConsumable, "unlock", 0)
    }

    #[test]
    fn test_observed_state_tracks_events() {
        let observed = ObservedState::new();
        let option = lifetime();
        let state = EntitlementState::NonConsumable {
            transaction_id: TransactionId(9),
        };

        observed.handle(&EngineEvent::SnapshotChanged {
            entries: vec![SnapshotEntry {
                option: option.clone(),
                state: EntitlementState::Inactive,
            }],
        });
        assert!(!observed.is_entitled(&option));

        observed.handle(&EngineEvent::EntitlementUpdated {
            option: option.clone(),
            state: state.clone(),
        });
        assert_eq!(observed.entitlement_state(&option), state);

        observed.handle(&EngineEvent::FlowChanged {
            state: FlowState::Pending,
        });
        assert_eq!(observed.flow_state(), FlowState::Pending);

        observed.handle(&EngineEvent::ProductsLoaded {
            products: vec![Product::new("app.lifetime", "Lifetime", "$19.99")],
        });
        assert!(observed.product(&ProductId::new("app.lifetime")).is_some());
        assert_eq!(observed.network_allowed(), None);
    }

    #[test]
    fn test_update_for_unconfigured_option_ignored() {
        let observed = ObservedState::new();
        observed.handle(&EngineEvent::EntitlementUpdated {
            option: lifetime(),
            state: EntitlementState::NonConsumable {
                transaction_id: TransactionId(1),
            },
        });
        assert!(observed.snapshot().is_empty());
    }

    #[test]
    fn test_delegate_receives_callbacks() {
        #[derive(Default)]
        struct Recorder {
            flows: Mutex<Vec<FlowState>>,
            network: Mutex<Vec<bool>>,
        }
        impl EngineDelegate for &'static Recorder {
            fn flow_changed(&self, state: &FlowState) {
                self.flows.lock().push(state.clone());
            }
            fn network_changed(&self, allowed: bool) {
                self.network.lock().push(allowed);
            }
        }

        let recorder: &'static Recorder = Box::leak(Box::new(Recorder::default()));
        let sink = DelegateSink::new(recorder);

        sink.handle(&EngineEvent::FlowChanged {
            state: FlowState::Purchasing,
        });
        sink.handle(&EngineEvent::NetworkChanged { allowed: true });
        sink.handle(&EngineEvent::ListenerStarted);

        assert_eq!(*recorder.flows.lock(), vec![FlowState::Purchasing]);
        assert_eq!(*recorder.network.lock(), vec![true]);
    }
}
