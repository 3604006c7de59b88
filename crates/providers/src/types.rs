use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive span of UTC calendar days covered by one upstream fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of the span
    pub start: NaiveDate,
    /// Last day of the span (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range, swapping the bounds if they arrive reversed
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// A range covering exactly one day
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Whether `day` falls inside the range
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Availability of one site on one UTC day, as normalized from an upstream payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityCell {
    /// Provider key, e.g. `recreationdotgov`
    pub provider: String,
    /// Upstream campground identifier
    pub campground_id: String,
    /// Upstream site identifier
    pub site_id: String,
    /// Human-facing site label, e.g. `C36`
    pub site_name: String,
    /// UTC calendar day
    pub day: NaiveDate,
    /// Whether the site can be booked for that night
    pub available: bool,
    /// Nightly price when the upstream reports one
    pub price: Option<f64>,
    /// When the upstream was asked
    pub checked_at: DateTime<Utc>,
}

/// Descriptive metadata for one campground
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampgroundEntry {
    /// Provider key
    pub provider: String,
    /// Upstream campground identifier
    pub campground_id: String,
    /// Display name
    pub name: String,
    /// Free-text description
    pub description: Option<String>,
    /// Latitude in decimal degrees
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees
    pub longitude: Option<f64>,
    /// Amenity labels (water, showers, ...)
    pub amenities: Vec<String>,
    /// Typical nightly price
    pub price: Option<f64>,
    /// Public booking page
    pub url: String,
}

/// Descriptive metadata for one campsite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampsiteEntry {
    /// Provider key
    pub provider: String,
    /// Upstream campground identifier
    pub campground_id: String,
    /// Upstream site identifier
    pub site_id: String,
    /// Human-facing site label
    pub name: String,
    /// Site type (standard, tent only, RV, ...)
    pub site_type: Option<String>,
    /// Loop or area the site belongs to
    pub loop_name: Option<String>,
    /// Latitude in decimal degrees
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees
    pub longitude: Option<f64>,
    /// Amenity labels
    pub amenities: Vec<String>,
    /// Permitted equipment (tent, trailer, RV up to N ft, ...)
    pub equipment: Vec<String>,
    /// Nightly price
    pub price: Option<f64>,
    /// Maximum number of people allowed
    pub max_people: Option<u32>,
    /// Whether the site is marked accessible
    pub accessible: bool,
    /// Public booking page for the site
    pub url: String,
}
