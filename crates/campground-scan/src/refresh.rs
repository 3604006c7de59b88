use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use notification_services::NotificationEvent;
use providers::{DateRange, Provider, http::polite_pause};
use tokio::time::timeout_at;
use tracing::{debug, info, warn};

use crate::context::ScanContext;
use crate::diff::{diff_cells, match_subscriptions};
use crate::locks::PairGuard;
use crate::scan_types::{PairKey, ScanError};

/// What one fetch-diff-persist-notify pass did for a pair
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    /// Cells returned by the adapter
    pub cells_fetched: usize,
    /// Cells that went from closed to open
    pub newly_available: usize,
    /// Cells that went from open to closed
    pub newly_unavailable: usize,
    /// Events produced for matching subscriptions
    pub events: Vec<NotificationEvent>,
    /// Events whose message made it into the notifier queue
    pub events_queued: usize,
    /// Chat messages queued for those events
    pub messages_queued: usize,
}

/// Fetches `ranges` for the guarded pair, diffs against the stored snapshot,
/// persists the fresh snapshot and only then queues notifications.
///
/// Shared by the scheduler and the adhoc path so both notify identically.
/// The pass is abandoned with [`ScanError::Timeout`] once the guard's
/// deadline passes.
pub async fn refresh_pair(
    ctx: &ScanContext,
    provider: &dyn Provider,
    guard: &PairGuard,
    ranges: &[DateRange],
    today: NaiveDate,
) -> Result<RefreshOutcome, ScanError> {
    let pair = guard.key();
    match timeout_at(guard.deadline(), refresh_locked(ctx, provider, pair, ranges, today)).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::Timeout(format!(
            "Refresh of {} did not finish within its lock",
            pair
        ))),
    }
}

async fn refresh_locked(
    ctx: &ScanContext,
    provider: &dyn Provider,
    pair: &PairKey,
    ranges: &[DateRange],
    today: NaiveDate,
) -> Result<RefreshOutcome, ScanError> {
    let campground_id = pair.campground_id.as_str();

    let mut fresh = Vec::new();
    for (index, range) in ranges.iter().enumerate() {
        if index > 0 {
            polite_pause(ctx.request_delay).await;
        }
        let cells = provider.fetch_availability(campground_id, *range).await?;
        debug!("Fetched {} cells for {} over {}", cells.len(), pair, range);
        fresh.extend(cells);
    }

    let prior = ctx
        .store
        .snapshot(&pair.provider, campground_id, ranges)
        .await?;
    let diff = diff_cells(&prior, &fresh, ranges);

    let subscriptions = ctx
        .store
        .active_subscriptions_for(&pair.provider, campground_id)
        .await?;
    let events = match_subscriptions(&diff.newly_available, &subscriptions, today, |cell| {
        provider.campsite_url(&cell.campground_id, &cell.site_id)
    });

    // nothing is announced unless the new baseline is durable
    ctx.store
        .apply_snapshot(&pair.provider, campground_id, ranges, &fresh)
        .await?;

    let mut events_queued = 0;
    let mut messages_queued = 0;
    if !events.is_empty() {
        // only what reached the queue counts as sent
        let queued = ctx.notifier.dispatch(events.clone());
        events_queued = queued.len();
        messages_queued = queued
            .iter()
            .map(|event| event.subscription_id)
            .collect::<BTreeSet<_>>()
            .len();
        if !queued.is_empty() {
            if let Err(e) = ctx.store.record_notifications(&queued, Utc::now()).await {
                warn!("Failed to record notifications for {}: {}", pair, e);
            }
        }
        info!(
            "🎉 {} newly available cells in {}, {} notifications ({} queued in {} messages)",
            diff.newly_available.len(),
            pair,
            events.len(),
            events_queued,
            messages_queued
        );
    } else {
        debug!("No new availability for {}", pair);
    }

    Ok(RefreshOutcome {
        cells_fetched: fresh.len(),
        newly_available: diff.newly_available.len(),
        newly_unavailable: diff.newly_unavailable.len(),
        events,
        events_queued,
        messages_queued,
    })
}
