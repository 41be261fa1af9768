//! Entitlement state, snapshots, and the exclusivity reduction.
//!
//! Everything here is pure data and pure functions. The owner actor in
//! [`crate::service`] is the only place a published snapshot is replaced.

mod entitlement;
mod policy;
mod snapshot;

pub use entitlement::{classify, EntitlementState};
pub use policy::{enforce_exclusivity, reduce};
pub use snapshot::{EntitlementSnapshot, SnapshotEntry};
