use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use notification_services::NotificationError;
use providers::ProviderError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::store::StoreError;

/// A (provider, campground) pair; the unit of fetching, diffing and locking
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    /// Provider key
    pub provider: String,
    /// Upstream campground identifier
    pub campground_id: String,
}

impl PairKey {
    /// Builds a key from borrowed parts
    pub fn new(provider: &str, campground_id: &str) -> Self {
        Self {
            provider: provider.to_string(),
            campground_id: campground_id.to_string(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.campground_id)
    }
}

/// A user's standing request to hear about openings at a campground
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    /// Unique identifier for the subscription
    pub id: Uuid,
    /// Chat user to notify
    pub user_id: String,
    /// Provider key
    pub provider: String,
    /// Upstream campground identifier
    pub campground_id: String,
    /// `None` or `*` matches every site; otherwise a comma-separated list of
    /// site names or ids
    pub site_filter: Option<String>,
    /// First night of interest
    pub start_date: NaiveDate,
    /// Last night of interest (inclusive)
    pub end_date: NaiveDate,
    /// Cleared once the subscription expires or is cancelled
    pub active: bool,
    /// When the subscription was created
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// The pair this subscription watches
    pub fn pair(&self) -> PairKey {
        PairKey::new(&self.provider, &self.campground_id)
    }

    /// Whether `day` falls inside the subscription's range
    pub fn covers(&self, day: NaiveDate) -> bool {
        day >= self.start_date && day <= self.end_date
    }

    /// Whether the site filter accepts a site, by name or id, ignoring case
    pub fn matches_site(&self, site_id: &str, site_name: &str) -> bool {
        let filter = match self.site_filter.as_deref().map(str::trim) {
            None | Some("") | Some("*") => return true,
            Some(filter) => filter,
        };

        filter
            .split(',')
            .map(str::trim)
            .filter(|wanted| !wanted.is_empty())
            .any(|wanted| {
                wanted == "*"
                    || wanted.eq_ignore_ascii_case(site_name)
                    || wanted.eq_ignore_ascii_case(site_id)
            })
    }

    /// Requested nights from `today` onward
    pub fn requested_days(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let start = self.start_date.max(today);
        if start > self.end_date {
            return Vec::new();
        }
        start
            .iter_days()
            .take_while(|day| *day <= self.end_date)
            .collect()
    }
}

/// Lifecycle of an on-demand scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdhocStatus {
    /// Accepted and being processed
    Pending,
    /// Fetch, diff and persist finished
    Completed,
    /// The fetch failed or timed out
    Failed,
}

impl AdhocStatus {
    /// Lowercase name used in storage and JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            AdhocStatus::Pending => "pending",
            AdhocStatus::Completed => "completed",
            AdhocStatus::Failed => "failed",
        }
    }
}

impl FromStr for AdhocStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AdhocStatus::Pending),
            "completed" => Ok(AdhocStatus::Completed),
            "failed" => Ok(AdhocStatus::Failed),
            other => Err(format!("unknown adhoc status: {}", other)),
        }
    }
}

/// A user-triggered out-of-band fetch of one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdhocScrapeRequest {
    /// Unique identifier for the request
    pub id: Uuid,
    /// Provider key
    pub provider: String,
    /// Upstream campground identifier
    pub campground_id: String,
    /// Who asked for it
    pub requester_id: String,
    /// When it was accepted
    pub requested_at: DateTime<Utc>,
    /// Current status
    pub status: AdhocStatus,
    /// When a terminal status was recorded
    pub finished_at: Option<DateTime<Utc>>,
}

/// Request body for triggering an adhoc scrape
#[derive(Debug, Deserialize, Validate)]
pub struct AdhocScrapeBody {
    /// Chat user asking for the refresh
    #[validate(length(min = 1, max = 128, message = "Requester ID is required"))]
    pub requester_id: String,
}

/// Response for the adhoc status check
#[derive(Debug, Serialize)]
pub struct AdhocStatusResponse {
    /// Whether a new request would be accepted right now
    pub can_request: bool,
    /// Most recent request for the pair, if any
    pub latest: Option<AdhocScrapeRequest>,
}

/// Result of a catalog sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Entries written to the store
    pub synced: usize,
    /// Entries or campgrounds that could not be fetched or written
    pub failed: usize,
}

/// Custom error type for scan operations
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Upstream failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Chat queue failure
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// A request for the same pair was accepted inside the cool-down window
    #[error("A refresh for this campground was requested recently")]
    Debounced,

    /// The operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl actix_web::ResponseError for ScanError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            ScanError::Provider(ProviderError::UnknownProvider(name)) => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "unknown_provider",
                    "message": format!("Unknown provider: {}", name)
                }))
            }
            ScanError::Provider(e) => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "provider_error",
                "message": format!("External API error: {}", e)
            })),
            ScanError::Debounced => HttpResponse::TooManyRequests().json(serde_json::json!({
                "error": "debounced",
                "message": "A refresh for this campground was requested recently. Please try again later."
            })),
            ScanError::Validation(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "validation_error",
                "message": msg
            })),
            ScanError::Timeout(msg) => HttpResponse::GatewayTimeout().json(serde_json::json!({
                "error": "timeout",
                "message": msg
            })),
            _ => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "internal_error",
                "message": "An internal error occurred"
            })),
        }
    }
}
