use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use providers::{DateRange, Provider};

use crate::scan_types::{PairKey, Subscription};

/// The nights one pair must be fetched for this cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PairPlan {
    /// Pair to fetch
    pub pair: PairKey,
    /// Union of every subscription's requested nights
    pub days: BTreeSet<NaiveDate>,
    /// Number of subscriptions watching the pair
    pub subscribers: usize,
}

/// Groups subscriptions by pair and unions their requested nights.
///
/// Pairs with nothing left to fetch (every range in the past) are dropped.
pub fn plan_pairs(subscriptions: &[Subscription], today: NaiveDate) -> Vec<PairPlan> {
    let mut plans: BTreeMap<PairKey, PairPlan> = BTreeMap::new();

    for subscription in subscriptions.iter().filter(|s| s.active) {
        let days = subscription.requested_days(today);
        if days.is_empty() {
            continue;
        }

        let plan = plans
            .entry(subscription.pair())
            .or_insert_with(|| PairPlan {
                pair: subscription.pair(),
                days: BTreeSet::new(),
                subscribers: 0,
            });
        plan.days.extend(days);
        plan.subscribers += 1;
    }

    plans.into_values().collect()
}

/// Asks the adapter how to bucket the requested nights
pub fn plan_ranges(provider: &dyn Provider, days: &BTreeSet<NaiveDate>) -> Vec<DateRange> {
    let instants: Vec<DateTime<Utc>> = days
        .iter()
        .filter_map(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .collect();
    provider.plan_buckets(&instants)
}
