use std::time::Duration;

use chrono::{DateTime, Utc};
use notification_services::DigestSummary;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{error, info};

use crate::context::ScanContext;
use crate::scan_types::ScanError;

/// Builds the digest for the window ending at `until` and queues it
pub async fn send_digest(
    ctx: &ScanContext,
    channel: &str,
    window: chrono::Duration,
    until: DateTime<Utc>,
) -> Result<DigestSummary, ScanError> {
    let summary = ctx.store.digest_summary(until - window, until).await?;
    ctx.notifier.send_digest(channel, &summary)?;
    info!(
        "Queued digest for #{}: {} notifications to {} users",
        channel, summary.notifications_sent, summary.users_notified
    );
    Ok(summary)
}

/// Periodic activity digest posted to a shared channel
pub struct DigestJob {
    ctx: ScanContext,
    channel: String,
    period: Duration,
}

impl DigestJob {
    /// Creates the job
    pub fn new(ctx: ScanContext, channel: impl Into<String>, period: Duration) -> Self {
        Self {
            ctx,
            channel: channel.into(),
            period,
        }
    }

    /// Posts a digest every `period` until `shutdown` flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("🚀 Starting digest for #{} every {:?}", self.channel, self.period);

        let window = chrono::Duration::from_std(self.period)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut ticker = interval_at(tokio::time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = send_digest(&self.ctx, &self.channel, window, Utc::now()).await {
                error!("Failed to send digest: {}", e);
            }
        }

        info!("🛑 Digest stopped");
    }
}
