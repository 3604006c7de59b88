use std::fmt::Write;

use crate::types::{DigestSummary, NotificationEvent};

/// Renders one chat message for a group of events from the same subscription
pub fn availability_message(events: &[NotificationEvent]) -> String {
    let mut sorted: Vec<&NotificationEvent> = events.iter().collect();
    sorted.sort_by(|a, b| a.day.cmp(&b.day).then_with(|| a.site_name.cmp(&b.site_name)));

    let mut text = match sorted.first() {
        Some(first) => format!(
            "🏕️ New availability at {} campground {}\n",
            first.provider, first.campground_id
        ),
        None => return String::new(),
    };

    for event in sorted {
        let _ = writeln!(
            text,
            "• Site {} on {}: {}",
            event.site_name,
            event.day.format("%a %Y-%m-%d"),
            event.booking_url
        );
    }

    text
}

/// Renders the digest posted to the shared channel
pub fn digest_message(summary: &DigestSummary) -> String {
    let mut text = format!(
        "📊 Campsite digest {} to {}\n",
        summary.since.format("%Y-%m-%d %H:%M UTC"),
        summary.until.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(text, "Notifications sent: {}", summary.notifications_sent);
    let _ = writeln!(text, "Users notified: {}", summary.users_notified);
    let _ = writeln!(text, "Active subscriptions: {}", summary.active_subscriptions);

    if summary.top_campgrounds.is_empty() {
        text.push_str("No campgrounds opened up in this window.\n");
    } else {
        text.push_str("Busiest campgrounds:\n");
        for (rank, activity) in summary.top_campgrounds.iter().enumerate() {
            let _ = writeln!(
                text,
                "{}. {} {} ({} notifications)",
                rank + 1,
                activity.provider,
                activity.campground_id,
                activity.notifications
            );
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CampgroundActivity;
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn event(site: &str, day: &str) -> NotificationEvent {
        NotificationEvent {
            subscription_id: Uuid::nil(),
            user_id: "U123".to_string(),
            provider: "recreationdotgov".to_string(),
            campground_id: "232447".to_string(),
            site_id: format!("id-{}", site),
            site_name: site.to_string(),
            day: NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
            booking_url: format!("https://www.recreation.gov/camping/campsites/id-{}", site),
        }
    }

    #[test]
    fn test_availability_message_lists_each_night_in_order() {
        let text = availability_message(&[
            event("C37", "2025-08-18"),
            event("C36", "2025-08-17"),
        ]);

        assert!(text.starts_with("🏕️ New availability at recreationdotgov campground 232447"));
        let c36 = text.find("Site C36 on Sun 2025-08-17").unwrap();
        let c37 = text.find("Site C37 on Mon 2025-08-18").unwrap();
        assert!(c36 < c37);
    }

    #[test]
    fn test_empty_group_renders_nothing() {
        assert!(availability_message(&[]).is_empty());
    }

    #[test]
    fn test_digest_message_ranks_campgrounds() {
        let summary = DigestSummary {
            since: Utc.with_ymd_and_hms(2025, 8, 16, 0, 0, 0).unwrap(),
            until: Utc.with_ymd_and_hms(2025, 8, 17, 0, 0, 0).unwrap(),
            notifications_sent: 12,
            users_notified: 3,
            active_subscriptions: 40,
            top_campgrounds: vec![
                CampgroundActivity {
                    provider: "recreationdotgov".to_string(),
                    campground_id: "232447".to_string(),
                    notifications: 9,
                },
                CampgroundActivity {
                    provider: "reservecalifornia".to_string(),
                    campground_id: "674".to_string(),
                    notifications: 3,
                },
            ],
        };

        let text = digest_message(&summary);
        assert!(text.contains("Notifications sent: 12"));
        assert!(text.contains("Users notified: 3"));
        assert!(text.contains("1. recreationdotgov 232447 (9 notifications)"));
        assert!(text.contains("2. reservecalifornia 674 (3 notifications)"));
    }
}
