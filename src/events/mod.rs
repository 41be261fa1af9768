//! Event bus for entitlement, flow, and product changes.
//!
//! Core logic publishes [`EngineEvent`]s to a single [`EventBus`]. Consumers
//! attach either as:
//! - channel subscribers with a filter and a bounded buffer
//! - synchronous sinks ([`ObservedState`] for pull-style reads,
//!   [`DelegateSink`] for callback-style hosts)
//!
//! # Example
//!
//! ```ignore
//! let handle = bus.subscribe(SubscriptionConfig {
//!     filter: EventFilter::entitlements(),
//!     ..Default::default()
//! });
//!
//! while let Ok(event) = handle.recv() {
//!     match event {
//!         EngineEvent::EntitlementUpdated { option, state } => println!("{}: {:?}", option.id, state),
//!         EngineEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod adapters;
mod bus;
mod types;

pub use adapters::{DelegateSink, EngineDelegate, EventSink, ObservedState};
pub use bus::EventBus;
pub use types::{
    DropReason, EngineEvent, EventFilter, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
