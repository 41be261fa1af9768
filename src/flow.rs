//! Observable purchase/restore flow state.

use serde::{Deserialize, Serialize};

/// Global operation-in-progress signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    Purchasing,
    /// Deferred purchase (ask-to-buy) awaiting a later transaction.
    Pending,
    Failed { reason: String },
}

impl Default for FlowState {
    fn default() -> Self {
        FlowState::Idle
    }
}

/// Inputs that move the flow state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowTrigger {
    Started,
    Completed,
    Cancelled,
    Deferred,
    Failed(String),
    /// A transaction update resolved a deferred purchase.
    Resolved,
}

impl FlowState {
    pub fn is_busy(&self) -> bool {
        matches!(self, FlowState::Purchasing)
    }

    /// Next state for `trigger`.
    ///
    /// Concurrent operations share this field, so every trigger is accepted
    /// from any state except that `Resolved` only leaves `Pending`.
    pub fn apply(&self, trigger: FlowTrigger) -> FlowState {
        match trigger {
            FlowTrigger::Started => FlowState::Purchasing,
            FlowTrigger::Completed | FlowTrigger::Cancelled => FlowState::Idle,
            FlowTrigger::Deferred => FlowState::Pending,
            FlowTrigger::Failed(reason) => FlowState::Failed { reason },
            FlowTrigger::Resolved => match self {
                FlowState::Pending => FlowState::Idle,
                other => other.clone(),
            },
        }
    }
}
