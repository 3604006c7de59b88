//! Edge detection between the stored snapshot and a fresh fetch of one pair.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use notification_services::NotificationEvent;
use providers::{AvailabilityCell, DateRange};

use crate::scan_types::Subscription;

/// Identity of a cell inside one pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    /// Upstream site identifier
    pub site_id: String,
    /// UTC calendar day
    pub day: NaiveDate,
}

impl CellKey {
    fn of(cell: &AvailabilityCell) -> Self {
        Self {
            site_id: cell.site_id.clone(),
            day: cell.day,
        }
    }
}

/// How one cell moved between snapshot and fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellChange {
    /// Absent or false before, true now
    NewlyAvailable,
    /// True before, false or absent now
    NewlyUnavailable,
    /// Anything else
    Unchanged,
}

/// Classifies one cell given its prior and fresh state (`None` = absent)
pub fn classify(prior: Option<bool>, fresh: Option<bool>) -> CellChange {
    match (prior.unwrap_or(false), fresh.unwrap_or(false)) {
        (false, true) => CellChange::NewlyAvailable,
        (true, false) => CellChange::NewlyUnavailable,
        _ => CellChange::Unchanged,
    }
}

/// Outcome of diffing one pair
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Cells that just opened up
    pub newly_available: Vec<AvailabilityCell>,
    /// Cells that were open and no longer are
    pub newly_unavailable: Vec<CellKey>,
    /// Cells whose state did not move
    pub unchanged: usize,
}

/// Diffs a fresh fetch against the prior snapshot.
///
/// Only days inside `covered` are considered; anything else was not fetched
/// and says nothing about availability.
pub fn diff_cells(
    prior: &[AvailabilityCell],
    fresh: &[AvailabilityCell],
    covered: &[DateRange],
) -> DiffResult {
    let in_scope = |cell: &&AvailabilityCell| covered.iter().any(|r| r.contains(cell.day));

    let prior: BTreeMap<CellKey, bool> = prior
        .iter()
        .filter(in_scope)
        .map(|cell| (CellKey::of(cell), cell.available))
        .collect();
    let fresh: BTreeMap<CellKey, &AvailabilityCell> = fresh
        .iter()
        .filter(in_scope)
        .map(|cell| (CellKey::of(cell), cell))
        .collect();

    let mut result = DiffResult::default();

    for (key, cell) in &fresh {
        match classify(prior.get(key).copied(), Some(cell.available)) {
            CellChange::NewlyAvailable => result.newly_available.push((*cell).clone()),
            CellChange::NewlyUnavailable => result.newly_unavailable.push(key.clone()),
            CellChange::Unchanged => result.unchanged += 1,
        }
    }

    // cells that vanished from the fetch
    for (key, available) in &prior {
        if fresh.contains_key(key) {
            continue;
        }
        match classify(Some(*available), None) {
            CellChange::NewlyUnavailable => result.newly_unavailable.push(key.clone()),
            _ => result.unchanged += 1,
        }
    }

    result
}

/// Pairs newly available cells with the subscriptions that want them.
///
/// Pure: one event per (subscription, cell) match, nights before `today` excluded.
pub fn match_subscriptions(
    newly_available: &[AvailabilityCell],
    subscriptions: &[Subscription],
    today: NaiveDate,
    booking_url: impl Fn(&AvailabilityCell) -> String,
) -> Vec<NotificationEvent> {
    let mut events = Vec::new();

    for cell in newly_available.iter().filter(|cell| cell.day >= today) {
        for subscription in subscriptions {
            let wanted = subscription.active
                && subscription.provider == cell.provider
                && subscription.campground_id == cell.campground_id
                && subscription.covers(cell.day)
                && subscription.matches_site(&cell.site_id, &cell.site_name);
            if !wanted {
                continue;
            }

            events.push(NotificationEvent {
                subscription_id: subscription.id,
                user_id: subscription.user_id.clone(),
                provider: cell.provider.clone(),
                campground_id: cell.campground_id.clone(),
                site_id: cell.site_id.clone(),
                site_name: cell.site_name.clone(),
                day: cell.day,
                booking_url: booking_url(cell),
            });
        }
    }

    events
}
