//! Property tests for the exclusivity reduction.

use entitlement_engine::{
    reduce, Category, EntitlementSnapshot, EntitlementState, PurchaseOption, Timestamp,
    TransactionId,
};
use proptest::prelude::*;
use std::collections::HashMap;

fn base() -> Timestamp {
    Timestamp::from_secs(1_700_000_000)
}

/// (grouping, ordering, renewable, state kind, expiry offset in days)
fn arb_entry() -> impl Strategy<Value = (u8, u32, bool, u8, i64)> {
    (0u8..3, 0u32..4, any::<bool>(), 0u8..4, -30i64..400)
}

fn build(entries: &[(u8, u32, bool, u8, i64)]) -> Vec<(PurchaseOption, EntitlementState)> {
    entries
        .iter()
        .enumerate()
        .map(|(i, (group, ordering, renewable, kind, days))| {
            let category = if *renewable {
                Category::AutoRenewableSubscription
            } else {
                Category::NonRenewingSubscription
            };
            let option = PurchaseOption::new(
                format!("option-{}", i),
                format!("app.option.{}", i),
                category,
                format!("group-{}", group),
                *ordering,
            );
            let expires_at = base().add_days(*days);
            let state = match kind {
                0 => EntitlementState::Inactive,
                1 => EntitlementState::SubscriptionExpired { expires_at },
                2 => EntitlementState::Revoked {
                    revoked_at: base(),
                },
                _ => EntitlementState::SubscriptionActive {
                    expires_at,
                    transaction_id: TransactionId(i as u64),
                },
            };
            (option, state)
        })
        .collect()
}

proptest! {
    /// No grouping ever ends up with two active auto-renewable subscriptions.
    #[test]
    fn at_most_one_active_per_grouping(entries in prop::collection::vec(arb_entry(), 0..16)) {
        let incoming = build(&entries);
        let next = reduce(&EntitlementSnapshot::new(), &incoming);

        let mut active: HashMap<String, usize> = HashMap::new();
        for (option, state) in next.iter() {
            if option.category == Category::AutoRenewableSubscription && state.is_active() {
                *active.entry(option.grouping.clone()).or_default() += 1;
            }
        }
        prop_assert!(active.values().all(|count| *count <= 1));
    }

    /// Demoted subscriptions keep their own expiration date.
    #[test]
    fn demotion_preserves_expiry(entries in prop::collection::vec(arb_entry(), 0..16)) {
        let incoming = build(&entries);
        let next = reduce(&EntitlementSnapshot::new(), &incoming);

        for (option, state) in &incoming {
            if let EntitlementState::SubscriptionActive { expires_at, .. } = state {
                let result = next.state(option);
                if !result.is_active() {
                    prop_assert_eq!(result, EntitlementState::SubscriptionExpired { expires_at: *expires_at });
                }
            }
        }
    }

    /// Only active auto-renewable subscriptions are ever rewritten.
    #[test]
    fn other_states_pass_through(entries in prop::collection::vec(arb_entry(), 0..16)) {
        let incoming = build(&entries);
        let next = reduce(&EntitlementSnapshot::new(), &incoming);

        for (option, state) in &incoming {
            let contested = option.category == Category::AutoRenewableSubscription && state.is_active();
            if !contested {
                prop_assert_eq!(&next.state(option), state);
            }
        }
    }

    /// The result does not depend on the order facts arrive in one batch.
    #[test]
    fn reduction_is_order_independent(entries in prop::collection::vec(arb_entry(), 0..16)) {
        let incoming = build(&entries);
        let mut reversed = incoming.clone();
        reversed.reverse();

        let forward = reduce(&EntitlementSnapshot::new(), &incoming);
        let backward = reduce(&EntitlementSnapshot::new(), &reversed);
        prop_assert_eq!(forward, backward);
    }
}
