//! Core types for the entitlement engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds per day.
const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// Stable, host-assigned identifier of a purchasable option.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OptionId(pub String);

impl OptionId {
    pub fn new(id: impl Into<String>) -> Self {
        OptionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OptionId({})", self.0)
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform product identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        ProductId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProductId({})", self.0)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique platform transaction identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }

    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// Shift by a whole number of days (negative moves backwards).
    pub fn add_days(self, days: i64) -> Self {
        Timestamp(self.0.saturating_add(days.saturating_mul(MICROS_PER_DAY)))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// What kind of product an option sells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Consumable,
    NonConsumable,
    AutoRenewableSubscription,
    NonRenewingSubscription,
}

impl Category {
    pub fn is_subscription(self) -> bool {
        matches!(
            self,
            Category::AutoRenewableSubscription | Category::NonRenewingSubscription
        )
    }
}

/// Capability contract a host type implements to be sold through the engine.
///
/// The engine never sees the host type itself; it erases every option into a
/// [`PurchaseOption`] at the boundary.
pub trait PurchasableOption {
    fn id(&self) -> OptionId;
    fn product_id(&self) -> ProductId;
    fn category(&self) -> Category;
    /// Offering grouping used for exclusivity and sectioning.
    fn grouping(&self) -> String;
    /// Display ordering key; lower sorts first.
    fn ordering(&self) -> u32;

    fn erase(&self) -> PurchaseOption {
        PurchaseOption {
            id: self.id(),
            product_id: self.product_id(),
            category: self.category(),
            grouping: self.grouping(),
            ordering: self.ordering(),
        }
    }
}

/// Type-erased purchasable option.
///
/// Equality and hashing consider only `(id, product_id)`, so two erased
/// options built from different host types compare equal when those match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PurchaseOption {
    pub id: OptionId,
    pub product_id: ProductId,
    pub category: Category,
    pub grouping: String,
    pub ordering: u32,
}

impl PurchaseOption {
    pub fn new(
        id: impl Into<String>,
        product_id: impl Into<String>,
        category: Category,
        grouping: impl Into<String>,
        ordering: u32,
    ) -> Self {
        Self {
            id: OptionId::new(id),
            product_id: ProductId::new(product_id),
            category,
            grouping: grouping.into(),
            ordering,
        }
    }
}

impl PurchasableOption for PurchaseOption {
    fn id(&self) -> OptionId {
        self.id.clone()
    }

    fn product_id(&self) -> ProductId {
        self.product_id.clone()
    }

    fn category(&self) -> Category {
        self.category
    }

    fn grouping(&self) -> String {
        self.grouping.clone()
    }

    fn ordering(&self) -> u32 {
        self.ordering
    }

    fn erase(&self) -> PurchaseOption {
        self.clone()
    }
}

impl PartialEq for PurchaseOption {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.product_id == other.product_id
    }
}

impl Eq for PurchaseOption {}

impl Hash for PurchaseOption {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.product_id.hash(state);
    }
}

/// Outcome of the platform's cryptographic check on a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Verified,
    Unverified { reason: String },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }
}

/// A single transaction fact as delivered by the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub id: TransactionId,
    pub product_id: ProductId,
    pub purchased_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub verification: Verification,
}

impl RawTransaction {
    /// A verified transaction with no revocation or expiry.
    pub fn verified(id: u64, product_id: impl Into<String>) -> Self {
        Self {
            id: TransactionId(id),
            product_id: ProductId::new(product_id),
            purchased_at: Timestamp::now(),
            revoked_at: None,
            expires_at: None,
            verification: Verification::Verified,
        }
    }

    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_revocation(mut self, revoked_at: Timestamp) -> Self {
        self.revoked_at = Some(revoked_at);
        self
    }

    pub fn unverified(mut self, reason: impl Into<String>) -> Self {
        self.verification = Verification::Unverified {
            reason: reason.into(),
        };
        self
    }
}

/// Store product metadata as returned by the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub display_name: String,
    pub display_price: String,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        display_price: impl Into<String>,
    ) -> Self {
        Self {
            id: ProductId::new(id),
            display_name: display_name.into(),
            display_price: display_price.into(),
        }
    }
}
