use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use campground_scan::{AdhocConfig, AdhocScraper, MemoryStore, PairLocks, ScanContext};
use chrono::{DateTime, Utc};
use notification_services::{LogChatClient, Notifier, NotifierConfig};
use providers::{
    AvailabilityCell, CampgroundEntry, CampsiteEntry, DateRange, Provider, ProviderError,
    ProviderRegistry,
};

pub const STUB: &str = "stubprovider";

/// Two campgrounds with one site each and no availability
pub struct StubProvider;

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        STUB
    }

    fn plan_buckets(&self, days: &[DateTime<Utc>]) -> Vec<DateRange> {
        let mut dates: Vec<_> = days.iter().map(|d| d.date_naive()).collect();
        dates.sort();
        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => vec![DateRange::new(*first, *last)],
            _ => Vec::new(),
        }
    }

    async fn fetch_availability(
        &self,
        _campground_id: &str,
        _range: DateRange,
    ) -> Result<Vec<AvailabilityCell>, ProviderError> {
        Ok(Vec::new())
    }

    async fn fetch_catalog(&self) -> Result<Vec<CampgroundEntry>, ProviderError> {
        Ok(["1", "2"]
            .iter()
            .map(|id| CampgroundEntry {
                provider: STUB.to_string(),
                campground_id: id.to_string(),
                name: format!("Stub {}", id),
                ..Default::default()
            })
            .collect())
    }

    async fn fetch_site_catalog(
        &self,
        campground_id: &str,
    ) -> Result<Vec<CampsiteEntry>, ProviderError> {
        Ok(vec![CampsiteEntry {
            provider: STUB.to_string(),
            campground_id: campground_id.to_string(),
            site_id: format!("{}-A", campground_id),
            name: "A".to_string(),
            ..Default::default()
        }])
    }

    fn campground_url(&self, campground_id: &str) -> String {
        format!("https://stub.test/{}", campground_id)
    }

    fn campsite_url(&self, campground_id: &str, site_id: &str) -> String {
        format!("https://stub.test/{}/{}", campground_id, site_id)
    }
}

pub fn context() -> ScanContext {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(StubProvider));

    ScanContext::new(
        Arc::new(MemoryStore::new()),
        Arc::new(registry),
        Notifier::start(Arc::new(LogChatClient), NotifierConfig::default()),
        PairLocks::new(Duration::from_secs(60)),
        Duration::ZERO,
    )
}

pub fn scraper() -> AdhocScraper {
    AdhocScraper::new(context(), AdhocConfig::default())
}
