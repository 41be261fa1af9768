//! The complete option → entitlement mapping.

use super::entitlement::EntitlementState;
use crate::types::PurchaseOption;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One option and its state, as published to observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub option: PurchaseOption,
    pub state: EntitlementState,
}

/// Current entitlement state of every configured option.
///
/// Iteration order is unspecified; use [`EntitlementSnapshot::sorted`] for
/// display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntitlementSnapshot {
    states: HashMap<PurchaseOption, EntitlementState>,
}

impl EntitlementSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// All options `Inactive`.
    pub fn inactive(options: &[PurchaseOption]) -> Self {
        Self {
            states: options
                .iter()
                .map(|o| (o.clone(), EntitlementState::Inactive))
                .collect(),
        }
    }

    /// Snapshot for a new option set, keeping only states that were active
    /// for options present in both sets.
    pub fn reconfigured(&self, options: &[PurchaseOption]) -> Self {
        let states = options
            .iter()
            .map(|option| {
                let state = match self.states.get(option) {
                    Some(prev) if prev.is_active() => prev.clone(),
                    _ => EntitlementState::Inactive,
                };
                (option.clone(), state)
            })
            .collect();
        Self { states }
    }

    pub fn get(&self, option: &PurchaseOption) -> Option<&EntitlementState> {
        self.states.get(option)
    }

    /// State for an option, `Inactive` when the option is unknown.
    pub fn state(&self, option: &PurchaseOption) -> EntitlementState {
        self.states.get(option).cloned().unwrap_or_default()
    }

    pub fn is_entitled(&self, option: &PurchaseOption) -> bool {
        self.states.get(option).map_or(false, |s| s.is_active())
    }

    pub fn contains(&self, option: &PurchaseOption) -> bool {
        self.states.contains_key(option)
    }

    /// Set the state of an option, returning the previous one.
    pub fn insert(
        &mut self,
        option: PurchaseOption,
        state: EntitlementState,
    ) -> Option<EntitlementState> {
        self.states.insert(option, state)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PurchaseOption, &EntitlementState)> {
        self.states.iter()
    }

    /// Entries ordered by display ordering key, then option id.
    pub fn sorted(&self) -> Vec<SnapshotEntry> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| {
            a.option
                .ordering
                .cmp(&b.option.ordering)
                .then_with(|| a.option.id.cmp(&b.option.id))
        });
        entries
    }

    pub fn entries(&self) -> Vec<SnapshotEntry> {
        self.states
            .iter()
            .map(|(option, state)| SnapshotEntry {
                option: option.clone(),
                state: state.clone(),
            })
            .collect()
    }

    pub fn active_options(&self) -> Vec<&PurchaseOption> {
        self.states
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(option, _)| option)
            .collect()
    }

    /// Entries belonging to one offering grouping, in display order.
    pub fn group(&self, grouping: &str) -> Vec<SnapshotEntry> {
        self.sorted()
            .into_iter()
            .filter(|e| e.option.grouping == grouping)
            .collect()
    }
}
