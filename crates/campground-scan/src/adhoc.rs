use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::context::ScanContext;
use crate::planner::plan_ranges;
use crate::refresh::refresh_pair;
use crate::scan_types::{AdhocScrapeRequest, AdhocStatus, PairKey, ScanError};

/// Configuration for on-demand scrapes
#[derive(Debug, Clone)]
pub struct AdhocConfig {
    /// Minimum time between accepted requests for one pair (default: 5 minutes)
    pub cooldown: Duration,

    /// Upper bound on one request's fetch, including waiting for the pair lock
    /// (default: 2 minutes)
    pub timeout: Duration,

    /// Nights fetched when nobody subscribes to the pair yet (default: 90)
    pub horizon_days: u64,
}

impl Default for AdhocConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5 * 60),
            timeout: Duration::from_secs(2 * 60),
            horizon_days: 90,
        }
    }
}

/// Result of asking for an adhoc scrape
#[derive(Debug)]
pub enum AdhocOutcome {
    /// Refused; a request was accepted for the pair within the cool-down
    Debounced {
        /// The request that caused the refusal
        latest: Option<AdhocScrapeRequest>,
    },
    /// Accepted and run to a terminal status
    Processed(AdhocScrapeRequest),
}

/// Debounced entry point for user-triggered refreshes of one pair
#[derive(Clone)]
pub struct AdhocScraper {
    ctx: ScanContext,
    config: AdhocConfig,
}

impl AdhocScraper {
    /// Creates a scraper over the shared context
    pub fn new(ctx: ScanContext, config: AdhocConfig) -> Self {
        Self { ctx, config }
    }

    fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.cooldown)
            .unwrap_or_else(|_| chrono::Duration::minutes(5))
    }

    /// Whether a new request for the pair would be accepted right now
    pub async fn can_request(&self, provider: &str, campground_id: &str) -> Result<bool, ScanError> {
        self.ctx.registry.get(provider)?;
        let latest = self
            .ctx
            .store
            .latest_adhoc_request(provider, campground_id)
            .await?;

        Ok(latest.is_none_or(|r| r.requested_at <= Utc::now() - self.cooldown()))
    }

    /// Most recent request for the pair
    pub async fn latest(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Option<AdhocScrapeRequest>, ScanError> {
        Ok(self
            .ctx
            .store
            .latest_adhoc_request(provider, campground_id)
            .await?)
    }

    /// Creates a pending request unless debounced, then runs it to completion.
    ///
    /// The fetch runs in its own task bounded by the configured timeout, so it
    /// finishes and records its status even if the caller goes away.
    pub async fn request(
        &self,
        provider: &str,
        campground_id: &str,
        requester_id: &str,
    ) -> Result<AdhocOutcome, ScanError> {
        self.ctx.registry.get(provider)?;

        let created = self
            .ctx
            .store
            .create_adhoc_request_if_idle(
                provider,
                campground_id,
                requester_id,
                Utc::now(),
                self.cooldown(),
            )
            .await?;

        let Some(request) = created else {
            info!(
                "Debounced adhoc request for {}/{} from {}",
                provider, campground_id, requester_id
            );
            let latest = self
                .ctx
                .store
                .latest_adhoc_request(provider, campground_id)
                .await?;
            return Ok(AdhocOutcome::Debounced { latest });
        };

        info!(
            "Accepted adhoc request {} for {}/{} from {}",
            request.id, provider, campground_id, requester_id
        );

        let scraper = self.clone();
        let task = tokio::spawn(async move { scraper.process(request).await });
        match task.await {
            Ok(result) => Ok(AdhocOutcome::Processed(result?)),
            Err(e) => {
                error!("Adhoc task panicked: {}", e);
                Err(ScanError::Timeout(format!("adhoc task aborted: {}", e)))
            }
        }
    }

    async fn process(&self, request: AdhocScrapeRequest) -> Result<AdhocScrapeRequest, ScanError> {
        let pair = PairKey::new(&request.provider, &request.campground_id);
        let today = Utc::now().date_naive();

        let status = match timeout(self.config.timeout, self.scrape(&pair, today)).await {
            Ok(Ok(())) => AdhocStatus::Completed,
            Ok(Err(e)) => {
                warn!("Adhoc request {} for {} failed: {}", request.id, pair, e);
                AdhocStatus::Failed
            }
            Err(_) => {
                warn!(
                    "Adhoc request {} for {} timed out after {:?}",
                    request.id, pair, self.config.timeout
                );
                AdhocStatus::Failed
            }
        };

        Ok(self
            .ctx
            .store
            .set_adhoc_status(request.id, status, Utc::now())
            .await?)
    }

    async fn scrape(&self, pair: &PairKey, today: NaiveDate) -> Result<(), ScanError> {
        let provider = self.ctx.registry.get(&pair.provider)?;

        let subscriptions = self
            .ctx
            .store
            .active_subscriptions_for(&pair.provider, &pair.campground_id)
            .await?;
        let mut days: BTreeSet<NaiveDate> = subscriptions
            .iter()
            .flat_map(|s| s.requested_days(today))
            .collect();
        if days.is_empty() {
            days = self.horizon(today);
        }

        let ranges = plan_ranges(provider.as_ref(), &days);
        let guard = self.ctx.locks.acquire(pair).await;
        let outcome = refresh_pair(&self.ctx, provider.as_ref(), &guard, &ranges, today).await?;

        info!(
            "Adhoc refresh of {} fetched {} cells, {} newly available",
            pair, outcome.cells_fetched, outcome.newly_available
        );
        Ok(())
    }

    fn horizon(&self, today: NaiveDate) -> BTreeSet<NaiveDate> {
        let last = today
            .checked_add_days(Days::new(self.config.horizon_days.saturating_sub(1)))
            .unwrap_or(today);
        today.iter_days().take_while(|day| *day <= last).collect()
    }
}
