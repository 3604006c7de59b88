use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use notification_services::{CampgroundActivity, DigestSummary, NotificationEvent};
use providers::{AvailabilityCell, CampgroundEntry, CampsiteEntry, DateRange};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::scan_types::{AdhocScrapeRequest, AdhocStatus, PairKey, Subscription};

/// Campgrounds listed in the digest
pub const DIGEST_TOP_CAMPGROUNDS: usize = 5;

/// Errors raised by the persistence layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be converted
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persistence contract shared by the scheduler, adhoc path and sync jobs.
///
/// Every multi-row mutation is atomic: readers never see a half-applied batch.
#[async_trait]
pub trait Store: Send + Sync {
    /// All active subscriptions
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Active subscriptions watching one pair
    async fn active_subscriptions_for(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Deactivates subscriptions whose last night is before `today`
    async fn deactivate_expired(&self, today: NaiveDate) -> Result<u64, StoreError>;

    /// Stored cells of one pair that fall inside `covered`
    async fn snapshot(
        &self,
        provider: &str,
        campground_id: &str,
        covered: &[DateRange],
    ) -> Result<Vec<AvailabilityCell>, StoreError>;

    /// Replaces the pair's cells inside `covered` with `cells` in one write
    async fn apply_snapshot(
        &self,
        provider: &str,
        campground_id: &str,
        covered: &[DateRange],
        cells: &[AvailabilityCell],
    ) -> Result<(), StoreError>;

    /// Inserts or refreshes campground metadata
    async fn upsert_campgrounds(&self, entries: &[CampgroundEntry]) -> Result<usize, StoreError>;

    /// Inserts or refreshes campsite metadata
    async fn upsert_campsites(&self, entries: &[CampsiteEntry]) -> Result<usize, StoreError>;

    /// Known campground ids of one provider
    async fn campground_ids(&self, provider: &str) -> Result<Vec<String>, StoreError>;

    /// Creates a pending request unless one was created for the pair within `cooldown`.
    ///
    /// The existence check and the insert happen atomically. Returns `None`
    /// when debounced.
    async fn create_adhoc_request_if_idle(
        &self,
        provider: &str,
        campground_id: &str,
        requester_id: &str,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<Option<AdhocScrapeRequest>, StoreError>;

    /// Most recent request for the pair
    async fn latest_adhoc_request(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Option<AdhocScrapeRequest>, StoreError>;

    /// Records a terminal status
    async fn set_adhoc_status(
        &self,
        id: Uuid,
        status: AdhocStatus,
        at: DateTime<Utc>,
    ) -> Result<AdhocScrapeRequest, StoreError>;

    /// Appends sent notifications to the activity log used by the digest
    async fn record_notifications(
        &self,
        events: &[NotificationEvent],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Aggregates activity in `[since, until)`
    async fn digest_summary(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<DigestSummary, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    subscriptions: BTreeMap<Uuid, Subscription>,
    cells: HashMap<PairKey, BTreeMap<(NaiveDate, String), AvailabilityCell>>,
    campgrounds: BTreeMap<(String, String), CampgroundEntry>,
    campsites: BTreeMap<(String, String, String), CampsiteEntry>,
    adhoc_requests: Vec<AdhocScrapeRequest>,
    notification_log: Vec<(NotificationEvent, DateTime<Utc>)>,
}

/// Notification history kept by [`MemoryStore`] unless configured otherwise
const DEFAULT_LOG_RETENTION_DAYS: i64 = 7;

/// In-process store for tests and database-less development runs.
///
/// Adhoc requests are kept only while they matter to debouncing and status
/// lookups, and the notification log only for its retention window.
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    log_retention: chrono::Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            log_retention: chrono::Duration::days(DEFAULT_LOG_RETENTION_DAYS),
        }
    }
}

fn in_covered(covered: &[DateRange], day: NaiveDate) -> bool {
    covered.iter().any(|range| range.contains(day))
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps logged notifications for `retention`; set it to the digest window
    pub fn with_log_retention(mut self, retention: std::time::Duration) -> Self {
        self.log_retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(DEFAULT_LOG_RETENTION_DAYS));
        self
    }

    /// Adds or replaces a subscription
    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.state
            .write()
            .await
            .subscriptions
            .insert(subscription.id, subscription);
    }

    /// Every stored campsite, for inspection
    pub async fn campsites(&self) -> Vec<CampsiteEntry> {
        self.state.read().await.campsites.values().cloned().collect()
    }

    /// Retained adhoc requests, oldest first
    pub async fn adhoc_requests(&self) -> Vec<AdhocScrapeRequest> {
        self.state.read().await.adhoc_requests.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn active_subscriptions_for(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.active && s.provider == provider && s.campground_id == campground_id)
            .cloned()
            .collect())
    }

    async fn deactivate_expired(&self, today: NaiveDate) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut expired = 0;
        for subscription in state.subscriptions.values_mut() {
            if subscription.active && subscription.end_date < today {
                subscription.active = false;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn snapshot(
        &self,
        provider: &str,
        campground_id: &str,
        covered: &[DateRange],
    ) -> Result<Vec<AvailabilityCell>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .cells
            .get(&PairKey::new(provider, campground_id))
            .map(|cells| {
                cells
                    .values()
                    .filter(|cell| in_covered(covered, cell.day))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply_snapshot(
        &self,
        provider: &str,
        campground_id: &str,
        covered: &[DateRange],
        cells: &[AvailabilityCell],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let pair_cells = state
            .cells
            .entry(PairKey::new(provider, campground_id))
            .or_default();

        pair_cells.retain(|(day, _), _| !in_covered(covered, *day));
        for cell in cells.iter().filter(|cell| in_covered(covered, cell.day)) {
            pair_cells.insert((cell.day, cell.site_id.clone()), cell.clone());
        }
        Ok(())
    }

    async fn upsert_campgrounds(&self, entries: &[CampgroundEntry]) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        for entry in entries {
            state.campgrounds.insert(
                (entry.provider.clone(), entry.campground_id.clone()),
                entry.clone(),
            );
        }
        Ok(entries.len())
    }

    async fn upsert_campsites(&self, entries: &[CampsiteEntry]) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        for entry in entries {
            state.campsites.insert(
                (
                    entry.provider.clone(),
                    entry.campground_id.clone(),
                    entry.site_id.clone(),
                ),
                entry.clone(),
            );
        }
        Ok(entries.len())
    }

    async fn campground_ids(&self, provider: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .campgrounds
            .keys()
            .filter(|(p, _)| p == provider)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn create_adhoc_request_if_idle(
        &self,
        provider: &str,
        campground_id: &str,
        requester_id: &str,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<Option<AdhocScrapeRequest>, StoreError> {
        let mut state = self.state.write().await;
        let recent = state.adhoc_requests.iter().any(|r| {
            r.provider == provider
                && r.campground_id == campground_id
                && r.requested_at > now - cooldown
        });
        if recent {
            return Ok(None);
        }

        // older finished requests of this pair are superseded by the new one
        state.adhoc_requests.retain(|r| {
            r.provider != provider
                || r.campground_id != campground_id
                || r.status == AdhocStatus::Pending
        });

        let request = AdhocScrapeRequest {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            campground_id: campground_id.to_string(),
            requester_id: requester_id.to_string(),
            requested_at: now,
            status: AdhocStatus::Pending,
            finished_at: None,
        };
        state.adhoc_requests.push(request.clone());
        Ok(Some(request))
    }

    async fn latest_adhoc_request(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Option<AdhocScrapeRequest>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .adhoc_requests
            .iter()
            .filter(|r| r.provider == provider && r.campground_id == campground_id)
            .max_by_key(|r| r.requested_at)
            .cloned())
    }

    async fn set_adhoc_status(
        &self,
        id: Uuid,
        status: AdhocStatus,
        at: DateTime<Utc>,
    ) -> Result<AdhocScrapeRequest, StoreError> {
        let mut state = self.state.write().await;
        let request = state
            .adhoc_requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("adhoc request {}", id)))?;

        request.status = status;
        request.finished_at = (status != AdhocStatus::Pending).then_some(at);
        Ok(request.clone())
    }

    async fn record_notifications(
        &self,
        events: &[NotificationEvent],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let horizon = at - self.log_retention;
        state.notification_log.retain(|(_, logged)| *logged > horizon);
        state
            .notification_log
            .extend(events.iter().cloned().map(|event| (event, at)));
        Ok(())
    }

    async fn digest_summary(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<DigestSummary, StoreError> {
        let state = self.state.read().await;
        let window: Vec<&NotificationEvent> = state
            .notification_log
            .iter()
            .filter(|(_, at)| *at >= since && *at < until)
            .map(|(event, _)| event)
            .collect();

        let users: HashSet<&str> = window.iter().map(|e| e.user_id.as_str()).collect();
        let mut per_campground: HashMap<(&str, &str), u64> = HashMap::new();
        for event in &window {
            *per_campground
                .entry((event.provider.as_str(), event.campground_id.as_str()))
                .or_default() += 1;
        }

        let mut top_campgrounds: Vec<CampgroundActivity> = per_campground
            .into_iter()
            .map(|((provider, campground_id), notifications)| CampgroundActivity {
                provider: provider.to_string(),
                campground_id: campground_id.to_string(),
                notifications,
            })
            .collect();
        top_campgrounds.sort_by(|a, b| {
            b.notifications
                .cmp(&a.notifications)
                .then_with(|| a.campground_id.cmp(&b.campground_id))
        });
        top_campgrounds.truncate(DIGEST_TOP_CAMPGROUNDS);

        Ok(DigestSummary {
            since,
            until,
            notifications_sent: window.len() as u64,
            users_notified: users.len() as u64,
            active_subscriptions: state.subscriptions.values().filter(|s| s.active).count() as u64,
            top_campgrounds,
        })
    }
}
