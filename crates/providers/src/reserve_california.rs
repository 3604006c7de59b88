use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bucketing::{normalize_days, single_span};
use crate::error::ProviderError;
use crate::http::{RetryPolicy, polite_pause, send_json, with_retry};
use crate::provider::Provider;
use crate::types::{AvailabilityCell, CampgroundEntry, CampsiteEntry, DateRange};

/// Registry key for ReserveCalifornia
pub const RESERVE_CALIFORNIA: &str = "reservecalifornia";

/// Base URLs used by the ReserveCalifornia adapter
#[derive(Debug, Clone)]
pub struct ReserveCaliforniaEndpoints {
    /// Reservation API (grid search, facility and unit lookups)
    pub api_base_url: String,
    /// Public site used for booking links
    pub public_base_url: String,
}

impl Default for ReserveCaliforniaEndpoints {
    fn default() -> Self {
        Self {
            api_base_url: "https://calirdr.usedirect.com/rdr/rdr".to_string(),
            public_base_url: "https://www.reservecalifornia.com".to_string(),
        }
    }
}

/// Adapter for the ReserveCalifornia grid API
pub struct ReserveCaliforniaClient {
    client: Client,
    endpoints: ReserveCaliforniaEndpoints,
    retry: RetryPolicy,
    request_delay: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GridRequest<'a> {
    facility_id: &'a str,
    start_date: String,
    end_date: String,
    unit_type_id: u32,
    min_vehicle_length: u32,
    unit_sort: &'static str,
    in_season_only: bool,
    web_only: bool,
    #[serde(rename = "IsADA")]
    is_ada: bool,
    sleeping_unit_id: u32,
    unit_category_id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GridResponse {
    facility: GridFacility,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GridFacility {
    #[serde(default)]
    units: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GridUnit {
    unit_id: Value,
    name: Option<String>,
    short_name: Option<String>,
    unit_type_name: Option<String>,
    #[serde(default)]
    is_ada: bool,
    #[serde(default)]
    slices: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GridSlice {
    date: String,
    #[serde(default)]
    is_free: bool,
    #[serde(default)]
    is_blocked: bool,
    #[serde(default)]
    is_walkin: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FacilityListing {
    facility_id: Value,
    name: String,
    description: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    amenities: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UnitDetail {
    name: Option<String>,
    unit_type_name: Option<String>,
    loop_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    max_occupancy: Option<u32>,
    max_vehicle_length: Option<f64>,
    #[serde(rename = "IsADA")]
    is_ada: Option<bool>,
    #[serde(default)]
    amenities: Vec<Value>,
    #[serde(default)]
    allowed_equipment: Vec<Value>,
    nightly_rate: Option<f64>,
}

/// Upstream ids come back as numbers or strings depending on the endpoint
fn id_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn labels(raw: &[Value]) -> Vec<String> {
    raw.iter()
        .filter_map(|item| {
            item.as_str()
                .map(str::to_string)
                .or_else(|| item.get("Name").and_then(Value::as_str).map(str::to_string))
        })
        .collect()
}

fn format_grid_date(day: NaiveDate) -> String {
    day.format("%m-%d-%Y").to_string()
}

impl ReserveCaliforniaClient {
    /// Create a new ReserveCalifornia adapter on top of the shared client
    pub fn new(client: Client) -> Self {
        Self::with_endpoints(client, ReserveCaliforniaEndpoints::default())
    }

    /// Create an adapter pointed at custom base URLs
    pub fn with_endpoints(client: Client, endpoints: ReserveCaliforniaEndpoints) -> Self {
        Self {
            client,
            endpoints,
            retry: RetryPolicy::default(),
            request_delay: Duration::from_millis(250),
        }
    }

    /// Overrides the retry policy used for upstream calls
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the pause between consecutive upstream calls
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    async fn search_grid(
        &self,
        campground_id: &str,
        range: DateRange,
    ) -> Result<GridResponse, ProviderError> {
        let url = format!("{}/search/grid", self.endpoints.api_base_url);
        let body = GridRequest {
            facility_id: campground_id,
            start_date: format_grid_date(range.start),
            end_date: format_grid_date(range.end),
            unit_type_id: 0,
            min_vehicle_length: 0,
            unit_sort: "orderby",
            in_season_only: true,
            web_only: true,
            is_ada: false,
            sleeping_unit_id: 0,
            unit_category_id: 0,
        };
        debug!("Grid search for facility {} over {}", campground_id, range);

        let label = format!("grid {} {}", campground_id, range);
        with_retry(&self.retry, &label, || {
            send_json(self.client.post(&url).json(&body))
        })
        .await
    }

    /// Decodes the unit map, logging and dropping malformed units
    fn decode_units(campground_id: &str, units: HashMap<String, Value>) -> Vec<(String, GridUnit)> {
        units
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_value::<GridUnit>(raw) {
                Ok(unit) => {
                    let unit_id = id_string(&unit.unit_id).unwrap_or(key);
                    Some((unit_id, unit))
                }
                Err(e) => {
                    warn!("Skipping malformed unit {} in {}: {}", key, campground_id, e);
                    None
                }
            })
            .collect()
    }

    fn parse_grid(
        &self,
        campground_id: &str,
        grid: GridResponse,
        range: DateRange,
        checked_at: DateTime<Utc>,
    ) -> Vec<AvailabilityCell> {
        let mut cells = Vec::new();

        for (unit_id, unit) in Self::decode_units(campground_id, grid.facility.units) {
            let site_name = unit
                .short_name
                .clone()
                .or_else(|| unit.name.clone())
                .unwrap_or_else(|| unit_id.clone());

            for (key, raw) in unit.slices {
                let slice: GridSlice = match serde_json::from_value(raw) {
                    Ok(slice) => slice,
                    Err(e) => {
                        warn!("Skipping malformed slice {} for unit {}: {}", key, unit_id, e);
                        continue;
                    }
                };
                let day = match slice
                    .date
                    .get(..10)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                {
                    Some(day) => day,
                    None => {
                        warn!("Failed to parse date {} for unit {}", slice.date, unit_id);
                        continue;
                    }
                };
                if !range.contains(day) {
                    continue;
                }

                cells.push(AvailabilityCell {
                    provider: RESERVE_CALIFORNIA.to_string(),
                    campground_id: campground_id.to_string(),
                    site_id: unit_id.clone(),
                    site_name: site_name.clone(),
                    day,
                    available: slice.is_free && !slice.is_blocked && !slice.is_walkin,
                    price: None,
                    checked_at,
                });
            }
        }

        cells
    }

    async fn fetch_unit_detail(&self, unit_id: &str) -> Result<UnitDetail, ProviderError> {
        let url = format!(
            "{}/fd/units/{}",
            self.endpoints.api_base_url,
            urlencoding::encode(unit_id)
        );
        let label = format!("unit detail {}", unit_id);
        with_retry(&self.retry, &label, || send_json(self.client.get(&url))).await
    }

    fn campsite_from_unit(&self, campground_id: &str, unit_id: &str, unit: &GridUnit) -> CampsiteEntry {
        CampsiteEntry {
            provider: RESERVE_CALIFORNIA.to_string(),
            campground_id: campground_id.to_string(),
            site_id: unit_id.to_string(),
            name: unit
                .short_name
                .clone()
                .or_else(|| unit.name.clone())
                .unwrap_or_else(|| unit_id.to_string()),
            site_type: unit.unit_type_name.clone(),
            accessible: unit.is_ada,
            url: self.campsite_url(campground_id, unit_id),
            ..Default::default()
        }
    }
}

fn merge_unit_detail(mut entry: CampsiteEntry, detail: UnitDetail) -> CampsiteEntry {
    if let Some(name) = detail.name {
        entry.name = name;
    }
    entry.site_type = detail.unit_type_name.or(entry.site_type);
    entry.loop_name = detail.loop_name.or(entry.loop_name);
    entry.latitude = detail.latitude.or(entry.latitude);
    entry.longitude = detail.longitude.or(entry.longitude);
    entry.max_people = detail.max_occupancy.or(entry.max_people);
    entry.price = detail.nightly_rate.or(entry.price);
    entry.accessible = detail.is_ada.unwrap_or(entry.accessible);

    let amenities = labels(&detail.amenities);
    if !amenities.is_empty() {
        entry.amenities = amenities;
    }
    let mut equipment = labels(&detail.allowed_equipment);
    if let Some(len) = detail.max_vehicle_length.filter(|len| *len > 0.0) {
        equipment.push(format!("Vehicle up to {} ft", len));
    }
    if !equipment.is_empty() {
        entry.equipment = equipment;
    }

    entry
}

#[async_trait]
impl Provider for ReserveCaliforniaClient {
    fn name(&self) -> &'static str {
        RESERVE_CALIFORNIA
    }

    /// The grid accepts any span, so one min-to-max range is enough
    fn plan_buckets(&self, days: &[DateTime<Utc>]) -> Vec<DateRange> {
        single_span(&normalize_days(days))
    }

    async fn fetch_availability(
        &self,
        campground_id: &str,
        range: DateRange,
    ) -> Result<Vec<AvailabilityCell>, ProviderError> {
        let grid = self.search_grid(campground_id, range).await?;
        Ok(self.parse_grid(campground_id, grid, range, Utc::now()))
    }

    async fn fetch_catalog(&self) -> Result<Vec<CampgroundEntry>, ProviderError> {
        // the listing is unpaged and each record already carries the catalog fields
        let url = format!("{}/fd/facilities", self.endpoints.api_base_url);
        let records: Vec<Value> =
            with_retry(&self.retry, "facility listing", || send_json(self.client.get(&url)))
                .await?;
        info!("ReserveCalifornia listed {} facilities", records.len());

        let mut entries = Vec::new();
        for raw in records {
            let facility: FacilityListing = match serde_json::from_value(raw) {
                Ok(facility) => facility,
                Err(e) => {
                    warn!("Skipping malformed facility: {}", e);
                    continue;
                }
            };
            let Some(campground_id) = id_string(&facility.facility_id) else {
                warn!("Skipping facility {} without an id", facility.name);
                continue;
            };

            entries.push(CampgroundEntry {
                provider: RESERVE_CALIFORNIA.to_string(),
                url: self.campground_url(&campground_id),
                campground_id,
                name: facility.name,
                description: facility.description.filter(|d| !d.is_empty()),
                latitude: facility.latitude,
                longitude: facility.longitude,
                amenities: labels(&facility.amenities),
                price: None,
            });
        }

        Ok(entries)
    }

    async fn fetch_site_catalog(
        &self,
        campground_id: &str,
    ) -> Result<Vec<CampsiteEntry>, ProviderError> {
        let today = Utc::now().date_naive();
        let grid = self
            .search_grid(campground_id, DateRange::single(today))
            .await?;

        let mut entries = Vec::new();
        for (unit_id, unit) in Self::decode_units(campground_id, grid.facility.units) {
            let coarse = self.campsite_from_unit(campground_id, &unit_id, &unit);
            polite_pause(self.request_delay).await;

            let entry = match self.fetch_unit_detail(&unit_id).await {
                Ok(detail) => merge_unit_detail(coarse, detail),
                Err(e) => {
                    warn!(
                        "Unit detail failed for {} in {}, keeping grid metadata: {}",
                        unit_id, campground_id, e
                    );
                    coarse
                }
            };
            entries.push(entry);
        }

        Ok(entries)
    }

    fn campground_url(&self, campground_id: &str) -> String {
        format!(
            "{}/Web/#!park/{}",
            self.endpoints.public_base_url,
            urlencoding::encode(campground_id)
        )
    }

    fn campsite_url(&self, campground_id: &str, site_id: &str) -> String {
        format!(
            "{}/Web/#!park/{}/{}",
            self.endpoints.public_base_url,
            urlencoding::encode(campground_id),
            urlencoding::encode(site_id)
        )
    }
}
