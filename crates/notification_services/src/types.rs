use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors raised while delivering chat messages.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Rate limiting, 5xx or network failure; worth retrying.
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// The chat backend refused the message.
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The outbound queue is at capacity.
    #[error("Notification queue is full")]
    QueueFull,

    /// The notifier has been shut down.
    #[error("Notification queue is closed")]
    QueueClosed,
}

impl NotificationError {
    /// Whether the delivery should be attempted again
    pub fn is_transient(&self) -> bool {
        matches!(self, NotificationError::Transient(_))
    }
}

/// A (site, day) that just became available for one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Subscription that matched
    pub subscription_id: Uuid,
    /// Chat user to notify
    pub user_id: String,
    /// Provider key
    pub provider: String,
    /// Upstream campground identifier
    pub campground_id: String,
    /// Upstream site identifier
    pub site_id: String,
    /// Human-facing site label
    pub site_name: String,
    /// The night that opened up
    pub day: NaiveDate,
    /// Where to book it
    pub booking_url: String,
}

/// Notification volume for one campground inside a digest window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampgroundActivity {
    /// Provider key
    pub provider: String,
    /// Upstream campground identifier
    pub campground_id: String,
    /// Notifications recorded for this campground
    pub notifications: u64,
}

/// Aggregate activity used to build the periodic digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSummary {
    /// Start of the window
    pub since: DateTime<Utc>,
    /// End of the window
    pub until: DateTime<Utc>,
    /// Notifications recorded in the window
    pub notifications_sent: u64,
    /// Distinct users notified in the window
    pub users_notified: u64,
    /// Subscriptions active at `until`
    pub active_subscriptions: u64,
    /// Busiest campgrounds, most notifications first
    pub top_campgrounds: Vec<CampgroundActivity>,
}
