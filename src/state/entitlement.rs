//! Per-option entitlement status and its derivation from transaction facts.

use crate::types::{Category, RawTransaction, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};

/// Normalized entitlement status of one option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntitlementState {
    /// No known entitlement.
    Inactive,

    /// One-time purchase, not revoked.
    NonConsumable { transaction_id: TransactionId },

    /// Within a paid or grace period.
    SubscriptionActive {
        expires_at: Timestamp,
        transaction_id: TransactionId,
    },

    /// Was active once, lapsed (or lost group exclusivity).
    SubscriptionExpired { expires_at: Timestamp },

    /// Refunded or revoked by the platform.
    Revoked { revoked_at: Timestamp },
}

impl Default for EntitlementState {
    fn default() -> Self {
        EntitlementState::Inactive
    }
}

impl EntitlementState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            EntitlementState::NonConsumable { .. } | EntitlementState::SubscriptionActive { .. }
        )
    }

    /// Expiration date for subscription states.
    pub fn expires_at(&self) -> Option<Timestamp> {
        match self {
            EntitlementState::SubscriptionActive { expires_at, .. }
            | EntitlementState::SubscriptionExpired { expires_at } => Some(*expires_at),
            _ => None,
        }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            EntitlementState::NonConsumable { transaction_id }
            | EntitlementState::SubscriptionActive { transaction_id, .. } => Some(*transaction_id),
            _ => None,
        }
    }
}

/// Derive the entitlement a single transaction grants for an option of
/// `category`, evaluated at `now`.
///
/// Precedence: revoked, then lapsed subscription, then active subscription,
/// then non-consumable. Consumables never carry a durable entitlement, and a
/// subscription fact without an expiration date cannot prove activity.
pub fn classify(category: Category, tx: &RawTransaction, now: Timestamp) -> EntitlementState {
    if let Some(revoked_at) = tx.revoked_at {
        return EntitlementState::Revoked { revoked_at };
    }

    match category {
        Category::AutoRenewableSubscription | Category::NonRenewingSubscription => {
            match tx.expires_at {
                Some(expires_at) if expires_at <= now => {
                    EntitlementState::SubscriptionExpired { expires_at }
                }
                Some(expires_at) => EntitlementState::SubscriptionActive {
                    expires_at,
                    transaction_id: tx.id,
                },
                None => EntitlementState::Inactive,
            }
        }
        Category::NonConsumable => EntitlementState::NonConsumable {
            transaction_id: tx.id,
        },
        Category::Consumable => EntitlementState::Inactive,
    }
}
