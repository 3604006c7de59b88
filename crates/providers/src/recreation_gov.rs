use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Months, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bucketing::{by_month, month_start, normalize_days};
use crate::error::ProviderError;
use crate::http::{RetryPolicy, polite_pause, send_json, with_retry};
use crate::provider::Provider;
use crate::types::{AvailabilityCell, CampgroundEntry, CampsiteEntry, DateRange};

/// Registry key for recreation.gov
pub const RECREATION_GOV: &str = "recreationdotgov";

const RIDB_PAGE_SIZE: usize = 50;

/// Base URLs used by the recreation.gov adapter
#[derive(Debug, Clone)]
pub struct RecGovEndpoints {
    /// Internal API that backs the booking site
    pub internal_base_url: String,
    /// RIDB public catalog API
    pub ridb_base_url: String,
    /// Public site used for booking links
    pub public_base_url: String,
}

impl Default for RecGovEndpoints {
    fn default() -> Self {
        Self {
            internal_base_url: "https://www.recreation.gov/api".to_string(),
            ridb_base_url: "https://ridb.recreation.gov/api/v1".to_string(),
            public_base_url: "https://www.recreation.gov".to_string(),
        }
    }
}

/// Client for interacting with recreation.gov
pub struct RecGovClient {
    client: Client,
    endpoints: RecGovEndpoints,
    api_key: Option<String>,
    retry: RetryPolicy,
    request_delay: Duration,
}

/// Response structure from the internal month availability API
#[derive(Debug, Deserialize)]
struct MonthAvailabilityResponse {
    #[serde(default)]
    campsites: HashMap<String, Value>,
}

/// Campsite availability data from the internal API
#[derive(Debug, Deserialize)]
struct CampsiteAvailabilityData {
    #[serde(default)]
    availabilities: HashMap<String, String>,
    campsite_id: Option<String>,
    site: Option<String>,
    #[serde(default)]
    quantities: HashMap<String, i64>,
}

/// A page of RIDB records
#[derive(Debug, Deserialize)]
struct RidbPage {
    #[serde(rename = "RECDATA", default)]
    rec_data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RidbFacility {
    #[serde(rename = "FacilityID")]
    facility_id: String,

    #[serde(rename = "FacilityName")]
    facility_name: String,

    #[serde(rename = "FacilityDescription")]
    description: Option<String>,

    #[serde(rename = "FacilityTypeDescription")]
    facility_type: Option<String>,

    #[serde(rename = "FacilityLatitude")]
    latitude: Option<f64>,

    #[serde(rename = "FacilityLongitude")]
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RidbCampsite {
    #[serde(rename = "CampsiteID")]
    campsite_id: String,

    #[serde(rename = "CampsiteName")]
    campsite_name: Option<String>,

    #[serde(rename = "CampsiteType")]
    campsite_type: Option<String>,

    #[serde(rename = "Loop")]
    campsite_loop: Option<String>,

    #[serde(rename = "CampsiteAccessible")]
    accessible: Option<Value>,

    #[serde(rename = "CampsiteLatitude")]
    latitude: Option<f64>,

    #[serde(rename = "CampsiteLongitude")]
    longitude: Option<f64>,

    #[serde(rename = "PERMITTEDEQUIPMENT", default)]
    permitted_equipment: Vec<RidbEquipment>,

    #[serde(rename = "ATTRIBUTES", default)]
    attributes: Vec<RidbAttribute>,
}

#[derive(Debug, Deserialize)]
struct RidbEquipment {
    #[serde(rename = "EquipmentName")]
    name: String,
    #[serde(rename = "MaxLength")]
    max_length: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RidbAttribute {
    #[serde(rename = "AttributeName")]
    name: String,
    #[serde(rename = "AttributeValue")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct CampgroundDetailResponse {
    campground: Value,
}

#[derive(Debug, Deserialize)]
struct CampsiteDetailResponse {
    campsite: CampsiteDetail,
}

#[derive(Debug, Deserialize)]
struct CampsiteDetail {
    campsite_name: Option<String>,
    campsite_type: Option<String>,
    #[serde(rename = "loop")]
    campsite_loop: Option<String>,
    campsite_latitude: Option<f64>,
    campsite_longitude: Option<f64>,
    #[serde(default)]
    attributes: Vec<CampsiteDetailAttribute>,
    #[serde(default)]
    permitted_equipment: Vec<CampsiteDetailEquipment>,
}

#[derive(Debug, Deserialize)]
struct CampsiteDetailAttribute {
    attribute_name: String,
    attribute_value: String,
}

#[derive(Debug, Deserialize)]
struct CampsiteDetailEquipment {
    equipment_name: String,
    max_length: Option<f64>,
}

impl RecGovClient {
    /// Create a new recreation.gov adapter on top of the shared client
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self::with_endpoints(client, api_key, RecGovEndpoints::default())
    }

    /// Create an adapter pointed at custom base URLs
    pub fn with_endpoints(
        client: Client,
        api_key: Option<String>,
        endpoints: RecGovEndpoints,
    ) -> Self {
        Self {
            client,
            endpoints,
            api_key,
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

    fn ridb_get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match self.api_key {
            Some(ref api_key) => request.header("apikey", api_key),
            None => request,
        }
    }

    /// Fetch one month page of availability
    async fn fetch_month(
        &self,
        campground_id: &str,
        month: NaiveDate,
    ) -> Result<MonthAvailabilityResponse, ProviderError> {
        let url = format!(
            "{}/camps/availability/campground/{}/month",
            self.endpoints.internal_base_url,
            urlencoding::encode(campground_id)
        );
        let start_date_param = format!("{}T00:00:00.000Z", month.format("%Y-%m-%d"));
        debug!("Making request to: {}?start_date={}", url, start_date_param);

        let label = format!("availability {} {}", campground_id, month.format("%Y-%m"));
        with_retry(&self.retry, &label, || {
            send_json(
                self.client
                    .get(&url)
                    .query(&[("start_date", start_date_param.as_str())]),
            )
        })
        .await
    }

    /// Fetch RIDB pages until a short page signals the end of results
    async fn fetch_ridb_pages(&self, url: &str) -> Result<Vec<Value>, ProviderError> {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let label = format!("RIDB {} offset {}", url, offset);
            let page: RidbPage = with_retry(&self.retry, &label, || {
                send_json(self.ridb_get(url).query(&[
                    ("limit", RIDB_PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ]))
            })
            .await?;

            let page_len = page.rec_data.len();
            records.extend(page.rec_data);

            if page_len < RIDB_PAGE_SIZE {
                break;
            }
            offset += page_len;
            polite_pause(self.request_delay).await;
        }

        Ok(records)
    }

    /// Best-effort campground detail lookup; failures yield no extra fields
    async fn fetch_campground_detail(&self, campground_id: &str) -> Option<Value> {
        let url = format!(
            "{}/camps/campgrounds/{}",
            self.endpoints.internal_base_url,
            urlencoding::encode(campground_id)
        );
        match send_json::<CampgroundDetailResponse>(self.client.get(&url)).await {
            Ok(detail) => Some(detail.campground),
            Err(e) => {
                warn!(
                    "Campground detail lookup failed for {}, using listing defaults: {}",
                    campground_id, e
                );
                None
            }
        }
    }

    async fn fetch_campsite_detail(&self, site_id: &str) -> Result<CampsiteDetail, ProviderError> {
        let url = format!(
            "{}/camps/campsites/{}",
            self.endpoints.internal_base_url,
            urlencoding::encode(site_id)
        );
        let label = format!("campsite detail {}", site_id);
        let response: CampsiteDetailResponse =
            with_retry(&self.retry, &label, || send_json(self.client.get(&url))).await?;
        Ok(response.campsite)
    }

    /// Convert one month page into cells, skipping malformed records
    fn parse_month(
        &self,
        campground_id: &str,
        page: MonthAvailabilityResponse,
        range: DateRange,
        checked_at: DateTime<Utc>,
    ) -> Vec<AvailabilityCell> {
        let mut cells = Vec::new();

        for (key, raw) in page.campsites {
            let data: CampsiteAvailabilityData = match serde_json::from_value(raw) {
                Ok(data) => data,
                Err(e) => {
                    warn!(
                        "Skipping malformed campsite {} in {}: {}",
                        key, campground_id, e
                    );
                    continue;
                }
            };

            let site_id = data.campsite_id.clone().unwrap_or_else(|| key.clone());
            let site_name = data.site.clone().unwrap_or_else(|| site_id.clone());

            for (date_str, status) in &data.availabilities {
                // Format: "2025-08-15T00:00:00Z"
                let date = match date_str
                    .get(..10)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                {
                    Some(date) => date,
                    None => {
                        warn!("Failed to parse date {} for site {}", date_str, site_id);
                        continue;
                    }
                };

                if !range.contains(date) {
                    continue;
                }

                let (mut available, price) = parse_availability_status(status);
                if available && data.quantities.get(date_str).is_some_and(|q| *q <= 0) {
                    available = false;
                }

                cells.push(AvailabilityCell {
                    provider: RECREATION_GOV.to_string(),
                    campground_id: campground_id.to_string(),
                    site_id: site_id.clone(),
                    site_name: site_name.clone(),
                    day: date,
                    available,
                    price,
                    checked_at,
                });
            }
        }

        cells
    }

    fn campground_from_listing(&self, facility: RidbFacility, detail: Option<Value>) -> CampgroundEntry {
        let mut entry = CampgroundEntry {
            provider: RECREATION_GOV.to_string(),
            url: self.campground_url(&facility.facility_id),
            campground_id: facility.facility_id,
            name: facility.facility_name,
            description: facility.description.filter(|d| !d.is_empty()),
            latitude: facility.latitude,
            longitude: facility.longitude,
            ..Default::default()
        };

        if let Some(detail) = detail {
            entry.amenities = amenity_labels(detail.get("amenities"));
            entry.price = detail
                .get("rate")
                .and_then(|rate| rate.as_array())
                .and_then(|rates| rates.first())
                .and_then(|rate| rate.get("price_per_night").or_else(|| rate.get("price")))
                .and_then(Value::as_f64);
            if entry.description.is_none() {
                entry.description = detail
                    .get("facility_description_map")
                    .and_then(|m| m.get("Overview"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }

        entry
    }

    fn campsite_from_listing(&self, campground_id: &str, site: &RidbCampsite) -> CampsiteEntry {
        let max_people = site
            .attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case("Max Num of People"))
            .and_then(|a| a.value.trim().parse().ok());

        CampsiteEntry {
            provider: RECREATION_GOV.to_string(),
            campground_id: campground_id.to_string(),
            site_id: site.campsite_id.clone(),
            name: site
                .campsite_name
                .clone()
                .unwrap_or_else(|| site.campsite_id.clone()),
            site_type: site.campsite_type.clone(),
            loop_name: site.campsite_loop.clone(),
            latitude: site.latitude,
            longitude: site.longitude,
            amenities: site
                .attributes
                .iter()
                .map(|a| format!("{}: {}", a.name, a.value))
                .collect(),
            equipment: site
                .permitted_equipment
                .iter()
                .map(|e| equipment_label(&e.name, e.max_length))
                .collect(),
            price: None,
            max_people,
            accessible: is_truthy(site.accessible.as_ref()),
            url: self.campsite_url(campground_id, &site.campsite_id),
        }
    }
}

/// Merge site detail fields over the coarse listing entry
fn merge_campsite_detail(mut entry: CampsiteEntry, detail: CampsiteDetail) -> CampsiteEntry {
    if let Some(name) = detail.campsite_name {
        entry.name = name;
    }
    entry.site_type = detail.campsite_type.or(entry.site_type);
    entry.loop_name = detail.campsite_loop.or(entry.loop_name);
    entry.latitude = detail.campsite_latitude.or(entry.latitude);
    entry.longitude = detail.campsite_longitude.or(entry.longitude);

    if !detail.attributes.is_empty() {
        entry.max_people = detail
            .attributes
            .iter()
            .find(|a| a.attribute_name.eq_ignore_ascii_case("Max Num of People"))
            .and_then(|a| a.attribute_value.trim().parse().ok())
            .or(entry.max_people);
        entry.amenities = detail
            .attributes
            .iter()
            .map(|a| format!("{}: {}", a.attribute_name, a.attribute_value))
            .collect();
    }
    if !detail.permitted_equipment.is_empty() {
        entry.equipment = detail
            .permitted_equipment
            .iter()
            .map(|e| equipment_label(&e.equipment_name, e.max_length))
            .collect();
    }

    entry
}

fn equipment_label(name: &str, max_length: Option<f64>) -> String {
    match max_length {
        Some(len) if len > 0.0 => format!("{} (max {} ft)", name, len),
        _ => name.to_string(),
    }
}

fn amenity_labels(raw: Option<&Value>) -> Vec<String> {
    match raw {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .or_else(|| item.get("name").and_then(Value::as_str).map(str::to_string))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn is_truthy(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "y" | "1"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

/// Parse availability status from recreation.gov internal API format
fn parse_availability_status(status: &str) -> (bool, Option<f64>) {
    match status {
        "Available" | "Open" => (true, None),
        "Reserved" => (false, None),
        "Not Available" => (false, None),
        "Not Reservable" | "Not Reservable Management" => (false, None),
        "Walk-up" | "NYR" | "Closed" | "Lottery" => (false, None),
        // Legacy RIDB format support
        "A" => (true, None),  // Available
        "R" => (false, None), // Reserved
        "X" => (false, None), // Not available
        "W" => (false, None), // Walk-up only
        "N" => (false, None), // Not reservable
        s if s.starts_with('$') => {
            // Price string, means available
            let price = s[1..].parse::<f64>().ok();
            (true, price)
        }
        _ => {
            debug!("Unknown availability status: {}", status);
            (false, None)
        }
    }
}

#[async_trait]
impl Provider for RecGovClient {
    fn name(&self) -> &'static str {
        RECREATION_GOV
    }

    /// The month endpoint always returns a whole calendar month
    fn plan_buckets(&self, days: &[DateTime<Utc>]) -> Vec<DateRange> {
        by_month(&normalize_days(days))
    }

    async fn fetch_availability(
        &self,
        campground_id: &str,
        range: DateRange,
    ) -> Result<Vec<AvailabilityCell>, ProviderError> {
        debug!(
            "Fetching availability for facility {} over {}",
            campground_id, range
        );

        let mut cells = Vec::new();
        let mut month = month_start(range.start);
        let mut first = true;

        while month <= range.end {
            if !first {
                polite_pause(self.request_delay).await;
            }
            first = false;

            let page = self.fetch_month(campground_id, month).await?;
            cells.extend(self.parse_month(campground_id, page, range, Utc::now()));

            month = match month.checked_add_months(Months::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        Ok(cells)
    }

    async fn fetch_catalog(&self) -> Result<Vec<CampgroundEntry>, ProviderError> {
        let url = format!("{}/facilities", self.endpoints.ridb_base_url);
        let records = self.fetch_ridb_pages(&url).await?;
        info!("RIDB listed {} facilities", records.len());

        let mut entries = Vec::new();
        for raw in records {
            let facility: RidbFacility = match serde_json::from_value(raw) {
                Ok(facility) => facility,
                Err(e) => {
                    warn!("Skipping malformed RIDB facility: {}", e);
                    continue;
                }
            };

            let is_campground = facility
                .facility_type
                .as_deref()
                .is_none_or(|t| t.eq_ignore_ascii_case("Campground"));
            if !is_campground {
                continue;
            }

            polite_pause(self.request_delay).await;
            let detail = self.fetch_campground_detail(&facility.facility_id).await;
            entries.push(self.campground_from_listing(facility, detail));
        }

        Ok(entries)
    }

    async fn fetch_site_catalog(
        &self,
        campground_id: &str,
    ) -> Result<Vec<CampsiteEntry>, ProviderError> {
        let url = format!(
            "{}/facilities/{}/campsites",
            self.endpoints.ridb_base_url,
            urlencoding::encode(campground_id)
        );
        let records = self.fetch_ridb_pages(&url).await?;

        let mut entries = Vec::new();
        for raw in records {
            let site: RidbCampsite = match serde_json::from_value(raw) {
                Ok(site) => site,
                Err(e) => {
                    warn!("Skipping malformed campsite in {}: {}", campground_id, e);
                    continue;
                }
            };

            let coarse = self.campsite_from_listing(campground_id, &site);
            polite_pause(self.request_delay).await;

            let entry = match self.fetch_campsite_detail(&site.campsite_id).await {
                Ok(detail) => merge_campsite_detail(coarse, detail),
                Err(e) => {
                    warn!(
                        "Campsite detail failed for {} in {}, keeping listing metadata: {}",
                        site.campsite_id, campground_id, e
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
            "{}/camping/campgrounds/{}",
            self.endpoints.public_base_url,
            urlencoding::encode(campground_id)
        )
    }

    fn campsite_url(&self, _campground_id: &str, site_id: &str) -> String {
        format!(
            "{}/camping/campsites/{}",
            self.endpoints.public_base_url,
            urlencoding::encode(site_id)
        )
    }
}
