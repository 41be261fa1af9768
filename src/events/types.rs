//! Event and subscription types.

use crate::flow::FlowState;
use crate::state::{EntitlementState, SnapshotEntry};
use crate::types::{Product, PurchaseOption};
use serde::{Deserialize, Serialize};

/// Configuration for a channel subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: EventFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: EventFilter::all(),
        }
    }
}

/// Which event families a subscriber receives.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Per-option updates and full snapshot changes.
    pub include_entitlements: bool,

    /// Flow state transitions.
    pub include_flow: bool,

    /// Product list and network changes.
    pub include_products: bool,

    /// Listener start/stop.
    pub include_lifecycle: bool,
}

impl EventFilter {
    pub fn entitlements() -> Self {
        Self {
            include_entitlements: true,
            ..Default::default()
        }
    }

    pub fn flow() -> Self {
        Self {
            include_flow: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            include_entitlements: true,
            include_flow: true,
            include_products: true,
            include_lifecycle: true,
        }
    }

    pub(crate) fn matches(&self, event: &EngineEvent) -> bool {
        match event {
            EngineEvent::EntitlementUpdated { .. } | EngineEvent::SnapshotChanged { .. } => {
                self.include_entitlements
            }
            EngineEvent::FlowChanged { .. } => self.include_flow,
            EngineEvent::ProductsLoaded { .. } | EngineEvent::NetworkChanged { .. } => {
                self.include_products
            }
            EngineEvent::ListenerStarted | EngineEvent::ListenerStopped => self.include_lifecycle,
            EngineEvent::Dropped { .. } => true,
        }
    }
}

/// Everything the engine tells the outside world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    // --- Entitlement Events ---
    /// One option's state after a transaction was reconciled.
    EntitlementUpdated {
        option: PurchaseOption,
        state: EntitlementState,
    },

    /// The published snapshot was replaced.
    SnapshotChanged { entries: Vec<SnapshotEntry> },

    // --- Flow Events ---
    FlowChanged { state: FlowState },

    // --- Product Events ---
    ProductsLoaded { products: Vec<Product> },

    NetworkChanged { allowed: bool },

    // --- Lifecycle Events ---
    ListenerStarted,

    ListenerStopped,

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to receive events from a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub receiver: crossbeam_channel::Receiver<EngineEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<EngineEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<EngineEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<EngineEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.receiver.try_iter().collect()
    }
}
