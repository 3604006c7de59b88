use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::types::{AvailabilityCell, CampgroundEntry, CampsiteEntry, DateRange};

/// Capability interface every upstream reservation system implements
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry key, e.g. `recreationdotgov`
    fn name(&self) -> &'static str;

    /// Groups the requested instants into the fewest upstream fetch windows.
    ///
    /// Inputs may repeat or arrive out of order. Every input day must be covered
    /// by at least one returned range.
    fn plan_buckets(&self, days: &[DateTime<Utc>]) -> Vec<DateRange>;

    /// Fetches availability for every site of a campground over `range`.
    ///
    /// Bad individual records are logged and skipped; transport or page-level
    /// decode failures fail the whole call.
    async fn fetch_availability(
        &self,
        campground_id: &str,
        range: DateRange,
    ) -> Result<Vec<AvailabilityCell>, ProviderError>;

    /// Enumerates every campground the provider lists
    async fn fetch_catalog(&self) -> Result<Vec<CampgroundEntry>, ProviderError>;

    /// Fetches site-level metadata for one campground
    async fn fetch_site_catalog(
        &self,
        campground_id: &str,
    ) -> Result<Vec<CampsiteEntry>, ProviderError>;

    /// Public booking page for a campground
    fn campground_url(&self, campground_id: &str) -> String;

    /// Public booking page for a single site
    fn campsite_url(&self, campground_id: &str, site_id: &str) -> String;
}
