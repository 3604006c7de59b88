//! Shared fixtures for scan integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use campground_scan::{
    AdhocScrapeRequest, AdhocStatus, MemoryStore, PairLocks, ScanContext, Store, StoreError,
    Subscription,
};
use chrono::{DateTime, NaiveDate, Utc};
use notification_services::{
    ChatClient, DigestSummary, NotificationError, NotificationEvent, Notifier, NotifierConfig,
};
use providers::bucketing::{normalize_days, single_span};
use providers::{
    AvailabilityCell, CampgroundEntry, CampsiteEntry, DateRange, Provider, ProviderError,
    ProviderRegistry,
};
use uuid::Uuid;

pub const FAKE: &str = "fakeprovider";

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// What the fake upstream answers for one campground
#[derive(Clone)]
pub enum Script {
    Cells(Vec<(&'static str, NaiveDate, bool)>),
    Fail,
}

/// Provider whose answers are set by the test between cycles
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Script>>,
    pub fetches: AtomicUsize,
    pub fetch_delay: Mutex<Duration>,
    pub catalog: Mutex<Vec<CampgroundEntry>>,
    pub catalog_delay: Mutex<Duration>,
    pub failing_site_catalogs: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn set(&self, campground_id: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(campground_id.to_string(), script);
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        FAKE
    }

    fn plan_buckets(&self, days: &[DateTime<Utc>]) -> Vec<DateRange> {
        single_span(&normalize_days(days))
    }

    async fn fetch_availability(
        &self,
        campground_id: &str,
        range: DateRange,
    ) -> Result<Vec<AvailabilityCell>, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        let script = self.scripts.lock().unwrap().get(campground_id).cloned();
        match script {
            Some(Script::Fail) => Err(ProviderError::Transient("HTTP 503".to_string())),
            Some(Script::Cells(cells)) => Ok(cells
                .into_iter()
                .filter(|(_, d, _)| range.contains(*d))
                .map(|(site, d, available)| AvailabilityCell {
                    provider: FAKE.to_string(),
                    campground_id: campground_id.to_string(),
                    site_id: site.to_string(),
                    site_name: site.to_string(),
                    day: d,
                    available,
                    price: None,
                    checked_at: Utc::now(),
                })
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_catalog(&self) -> Result<Vec<CampgroundEntry>, ProviderError> {
        let delay = *self.catalog_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        Ok(self.catalog.lock().unwrap().clone())
    }

    async fn fetch_site_catalog(
        &self,
        campground_id: &str,
    ) -> Result<Vec<CampsiteEntry>, ProviderError> {
        if self
            .failing_site_catalogs
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == campground_id)
        {
            return Err(ProviderError::Transient("HTTP 502".to_string()));
        }
        Ok(vec![CampsiteEntry {
            provider: FAKE.to_string(),
            campground_id: campground_id.to_string(),
            site_id: "1".to_string(),
            name: "A1".to_string(),
            ..Default::default()
        }])
    }

    fn campground_url(&self, campground_id: &str) -> String {
        format!("https://fake.test/{}", campground_id)
    }

    fn campsite_url(&self, campground_id: &str, site_id: &str) -> String {
        format!("https://fake.test/{}/{}", campground_id, site_id)
    }
}

/// Chat client that remembers every delivered message
#[derive(Default)]
pub struct RecordingChat {
    pub messages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<(), NotificationError> {
        self.messages
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<(), NotificationError> {
        self.messages
            .lock()
            .unwrap()
            .push((format!("#{}", channel), text.to_string()));
        Ok(())
    }
}

/// Memory store whose snapshot writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_apply: AtomicBool,
}

#[async_trait]
impl Store for FlakyStore {
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        self.inner.active_subscriptions().await
    }

    async fn active_subscriptions_for(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        self.inner.active_subscriptions_for(provider, campground_id).await
    }

    async fn deactivate_expired(&self, today: NaiveDate) -> Result<u64, StoreError> {
        self.inner.deactivate_expired(today).await
    }

    async fn snapshot(
        &self,
        provider: &str,
        campground_id: &str,
        covered: &[DateRange],
    ) -> Result<Vec<AvailabilityCell>, StoreError> {
        self.inner.snapshot(provider, campground_id, covered).await
    }

    async fn apply_snapshot(
        &self,
        provider: &str,
        campground_id: &str,
        covered: &[DateRange],
        cells: &[AvailabilityCell],
    ) -> Result<(), StoreError> {
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(StoreError::Serialization("disk full".to_string()));
        }
        self.inner
            .apply_snapshot(provider, campground_id, covered, cells)
            .await
    }

    async fn upsert_campgrounds(&self, entries: &[CampgroundEntry]) -> Result<usize, StoreError> {
        self.inner.upsert_campgrounds(entries).await
    }

    async fn upsert_campsites(&self, entries: &[CampsiteEntry]) -> Result<usize, StoreError> {
        self.inner.upsert_campsites(entries).await
    }

    async fn campground_ids(&self, provider: &str) -> Result<Vec<String>, StoreError> {
        self.inner.campground_ids(provider).await
    }

    async fn create_adhoc_request_if_idle(
        &self,
        provider: &str,
        campground_id: &str,
        requester_id: &str,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<Option<AdhocScrapeRequest>, StoreError> {
        self.inner
            .create_adhoc_request_if_idle(provider, campground_id, requester_id, now, cooldown)
            .await
    }

    async fn latest_adhoc_request(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Option<AdhocScrapeRequest>, StoreError> {
        self.inner.latest_adhoc_request(provider, campground_id).await
    }

    async fn set_adhoc_status(
        &self,
        id: Uuid,
        status: AdhocStatus,
        at: DateTime<Utc>,
    ) -> Result<AdhocScrapeRequest, StoreError> {
        self.inner.set_adhoc_status(id, status, at).await
    }

    async fn record_notifications(
        &self,
        events: &[NotificationEvent],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.record_notifications(events, at).await
    }

    async fn digest_summary(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<DigestSummary, StoreError> {
        self.inner.digest_summary(since, until).await
    }
}

pub struct Harness {
    pub ctx: ScanContext,
    pub store: Arc<FlakyStore>,
    pub provider: Arc<ScriptedProvider>,
    pub chat: Arc<RecordingChat>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Duration::from_secs(60), 64)
    }

    pub fn with_lock_ttl(ttl: Duration) -> Self {
        Self::build(ttl, 64)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self::build(Duration::from_secs(60), queue_capacity)
    }

    fn build(lock_ttl: Duration, queue_capacity: usize) -> Self {
        let store = Arc::new(FlakyStore::default());
        let provider = Arc::new(ScriptedProvider::default());
        let chat = Arc::new(RecordingChat::default());

        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());

        let notifier = Notifier::start(
            chat.clone(),
            NotifierConfig {
                workers: 2,
                queue_capacity,
                max_attempts: 3,
                retry_base_delay: Duration::from_millis(1),
            },
        );

        let ctx = ScanContext::new(
            store.clone(),
            Arc::new(registry),
            notifier,
            PairLocks::new(lock_ttl),
            Duration::ZERO,
        );

        Self {
            ctx,
            store,
            provider,
            chat,
        }
    }

    pub async fn subscribe(
        &self,
        user_id: &str,
        campground_id: &str,
        site_filter: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Subscription {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            provider: FAKE.to_string(),
            campground_id: campground_id.to_string(),
            site_filter: site_filter.map(str::to_string),
            start_date: start,
            end_date: end,
            active: true,
            created_at: Utc::now(),
        };
        self.store.inner.insert_subscription(subscription.clone()).await;
        subscription
    }

    /// Drains the notifier and returns every delivered message
    pub async fn delivered(&self) -> Vec<(String, String)> {
        self.ctx.notifier.shutdown().await;
        self.chat.messages.lock().unwrap().clone()
    }
}
