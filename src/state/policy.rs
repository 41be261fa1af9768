//! Subscription exclusivity reduction.

use super::entitlement::EntitlementState;
use super::snapshot::EntitlementSnapshot;
use crate::types::{Category, PurchaseOption, Timestamp};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Merge `incoming` into `current` and enforce at most one active
/// auto-renewable subscription per offering grouping.
///
/// Non-winning active subscriptions are demoted to `SubscriptionExpired`
/// carrying their own expiration date, even when that date is still in the
/// future. The winner has the latest expiration; ties go to the lower
/// ordering key, then the lower option id.
pub fn reduce(
    current: &EntitlementSnapshot,
    incoming: &[(PurchaseOption, EntitlementState)],
) -> EntitlementSnapshot {
    let mut next = current.clone();
    for (option, state) in incoming {
        next.insert(option.clone(), state.clone());
    }
    enforce_exclusivity(&mut next);
    next
}

/// Demote all but one active auto-renewable subscription in each grouping.
pub fn enforce_exclusivity(snapshot: &mut EntitlementSnapshot) {
    let mut groups: HashMap<&str, Vec<(&PurchaseOption, Timestamp)>> = HashMap::new();

    for (option, state) in snapshot.iter() {
        if option.category != Category::AutoRenewableSubscription {
            continue;
        }
        if let EntitlementState::SubscriptionActive { expires_at, .. } = state {
            groups
                .entry(option.grouping.as_str())
                .or_default()
                .push((option, *expires_at));
        }
    }

    let mut demotions = Vec::new();
    for (_, mut contenders) in groups {
        if contenders.len() < 2 {
            continue;
        }
        contenders.sort_by(|a, b| rank(a, b));
        for (option, expires_at) in contenders.into_iter().skip(1) {
            demotions.push((option.clone(), expires_at));
        }
    }

    for (option, expires_at) in demotions {
        tracing::debug!(option_id = %option.id, grouping = %option.grouping, "demoting non-exclusive subscription");
        snapshot.insert(option, EntitlementState::SubscriptionExpired { expires_at });
    }
}

/// Winner sorts first.
fn rank(a: &(&PurchaseOption, Timestamp), b: &(&PurchaseOption, Timestamp)) -> Ordering {
    b.1.cmp(&a.1)
        .then_with(|| a.0.ordering.cmp(&b.0.ordering))
        .then_with(|| a.0.id.cmp(&b.0.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;

    fn t0() -> Timestamp {
        Timestamp::from_secs(1_700_000_000)
    }

    fn sub(id: &str, grouping: &str, ordering: u32) -> PurchaseOption {
        PurchaseOption::new(
            id,
            format!("app.{}", id),
            Category::AutoRenewableSubscription,
            grouping,
            ordering,
        )
    }

    fn active(days: i64, tx: u64) -> EntitlementState {
        EntitlementState::SubscriptionActive {
            expires_at: t0().add_days(days),
            transaction_id: TransactionId(tx),
        }
    }

    #[test]
    fn test_monthly_yearly_pro_scenario() {
        let monthly = sub("monthly", "pro", 0);
        let yearly = sub("yearly", "pro", 1);
        let current = EntitlementSnapshot::inactive(&[monthly.clone(), yearly.clone()]);

        let next = reduce(
            &current,
            &[(yearly.clone(), active(365, 2)), (monthly.clone(), active(30, 1))],
        );

        assert_eq!(next.state(&yearly), active(365, 2));
        assert_eq!(
            next.state(&monthly),
            EntitlementState::SubscriptionExpired {
                expires_at: t0().add_days(30)
            }
        );
    }

    #[test]
    fn test_incoming_loses_to_existing_winner() {
        let monthly = sub("monthly", "pro", 0);
        let yearly = sub("yearly", "pro", 1);
        let mut current = EntitlementSnapshot::inactive(&[monthly.clone(), yearly.clone()]);
        current.insert(yearly.clone(), active(365, 2));

        let next = reduce(&current, &[(monthly.clone(), active(30, 3))]);
        assert!(next.is_entitled(&yearly));
        assert!(!next.is_entitled(&monthly));
    }

    #[test]
    fn test_tie_breaks_on_ordering_key() {
        let a = sub("a", "pro", 5);
        let b = sub("b", "pro", 2);
        let current = EntitlementSnapshot::inactive(&[a.clone(), b.clone()]);

        let next = reduce(&current, &[(a.clone(), active(30, 1)), (b.clone(), active(30, 2))]);
        assert!(next.is_entitled(&b));
        assert_eq!(
            next.state(&a),
            EntitlementState::SubscriptionExpired {
                expires_at: t0().add_days(30)
            }
        );
    }

    #[test]
    fn test_other_groups_and_categories_untouched() {
        let pro = sub("pro", "pro", 0);
        let team = sub("team", "team", 1);
        let lifetime = PurchaseOption::new("lifetime", "app.lifetime", Category::NonConsumable, "pro", 2);
        let pass = PurchaseOption::new(
            "pass",
            "app.pass",
            Category::NonRenewingSubscription,
            "pro",
            3,
        );
        let current = EntitlementSnapshot::inactive(&[
            pro.clone(),
            team.clone(),
            lifetime.clone(),
            pass.clone(),
        ]);

        let next = reduce(
            &current,
            &[
                (pro.clone(), active(30, 1)),
                (team.clone(), active(10, 2)),
                (
                    lifetime.clone(),
                    EntitlementState::NonConsumable {
                        transaction_id: TransactionId(3),
                    },
                ),
                (pass.clone(), active(400, 4)),
            ],
        );

        assert!(next.is_entitled(&pro));
        assert!(next.is_entitled(&team));
        assert!(next.is_entitled(&lifetime));
        assert!(next.is_entitled(&pass));
    }

    #[test]
    fn test_reduce_is_pure() {
        let monthly = sub("monthly", "pro", 0);
        let current = EntitlementSnapshot::inactive(&[monthly.clone()]);
        let before = current.clone();

        let a = reduce(&current, &[(monthly.clone(), active(30, 1))]);
        let b = reduce(&current, &[(monthly.clone(), active(30, 1))]);

        assert_eq!(current, before);
        assert_eq!(a, b);
    }
}
