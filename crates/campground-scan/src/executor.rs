use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use notification_services::NotificationEvent;
use providers::http::polite_pause;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::context::ScanContext;
use crate::planner::{PairPlan, plan_pairs, plan_ranges};
use crate::refresh::refresh_pair;
use crate::scan_types::ScanError;

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct ScanExecutorConfig {
    /// Time between polling cycles (default: 5 minutes)
    pub poll_interval: Duration,

    /// Pairs of one provider fetched at the same time (default: 4)
    pub provider_concurrency: usize,

    /// Pause between pair starts of one provider (default: 250 ms, plus jitter)
    pub request_delay: Duration,
}

impl Default for ScanExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            provider_concurrency: 4,
            request_delay: Duration::from_millis(250),
        }
    }
}

/// Summary of one polling cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Subscriptions deactivated because their range ended
    pub expired: u64,
    /// Pairs fetched, diffed and persisted
    pub pairs_polled: usize,
    /// Pairs whose fetch or persist failed
    pub pairs_failed: usize,
    /// Pairs skipped because another fetch held their lock
    pub pairs_skipped: usize,
    /// Events emitted this cycle
    pub notifications: Vec<NotificationEvent>,
}

enum PairOutcome {
    Polled(Vec<NotificationEvent>),
    Failed,
    Skipped,
}

/// Main scan execution engine
pub struct ScanExecutor {
    ctx: ScanContext,
    config: ScanExecutorConfig,
}

impl ScanExecutor {
    /// Creates an executor over the shared context
    pub fn new(ctx: ScanContext, config: ScanExecutorConfig) -> Self {
        Self { ctx, config }
    }

    /// Runs cycles on the configured interval until `shutdown` flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🚀 Starting availability polling every {:?}",
            self.config.poll_interval
        );

        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) => info!(
                    "Cycle finished: {} polled, {} failed, {} skipped, {} notifications, {} expired",
                    report.pairs_polled,
                    report.pairs_failed,
                    report.pairs_skipped,
                    report.notifications.len(),
                    report.expired
                ),
                Err(e) => error!("Error running polling cycle: {}", e),
            }
        }

        info!("🛑 Availability polling stopped");
    }

    /// Runs one cycle for the current UTC day
    pub async fn run_cycle(&self) -> Result<CycleReport, ScanError> {
        self.run_cycle_for(Utc::now().date_naive()).await
    }

    /// Runs one cycle as if `today` were the current UTC day
    pub async fn run_cycle_for(&self, today: NaiveDate) -> Result<CycleReport, ScanError> {
        let expired = self.ctx.store.deactivate_expired(today).await?;
        if expired > 0 {
            info!("Deactivated {} expired subscriptions", expired);
        }

        let subscriptions = self.ctx.store.active_subscriptions().await?;
        let plans = plan_pairs(&subscriptions, today);
        debug!(
            "{} active subscriptions across {} pairs",
            subscriptions.len(),
            plans.len()
        );

        let mut by_provider: BTreeMap<String, Vec<PairPlan>> = BTreeMap::new();
        for plan in plans {
            by_provider
                .entry(plan.pair.provider.clone())
                .or_default()
                .push(plan);
        }

        let provider_runs = by_provider
            .into_iter()
            .map(|(provider, plans)| self.poll_provider(provider, plans, today));
        let outcomes: Vec<PairOutcome> = join_all(provider_runs).await.into_iter().flatten().collect();

        let mut report = CycleReport {
            expired,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                PairOutcome::Polled(events) => {
                    report.pairs_polled += 1;
                    report.notifications.extend(events);
                }
                PairOutcome::Failed => report.pairs_failed += 1,
                PairOutcome::Skipped => report.pairs_skipped += 1,
            }
        }

        Ok(report)
    }

    async fn poll_provider(
        &self,
        provider_name: String,
        plans: Vec<PairPlan>,
        today: NaiveDate,
    ) -> Vec<PairOutcome> {
        let provider = match self.ctx.registry.get(&provider_name) {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Skipping {} pairs: {}", plans.len(), e);
                return plans.iter().map(|_| PairOutcome::Failed).collect();
            }
        };

        stream::iter(plans.into_iter().enumerate())
            .map(|(index, plan)| {
                let provider = provider.clone();
                async move {
                    if index > 0 {
                        polite_pause(self.config.request_delay).await;
                    }
                    self.poll_pair(provider.as_ref(), plan, today).await
                }
            })
            .buffer_unordered(self.config.provider_concurrency.max(1))
            .collect()
            .await
    }

    async fn poll_pair(
        &self,
        provider: &dyn providers::Provider,
        plan: PairPlan,
        today: NaiveDate,
    ) -> PairOutcome {
        let Some(guard) = self.ctx.locks.try_acquire(&plan.pair) else {
            debug!("Skipping {}, already being polled", plan.pair);
            return PairOutcome::Skipped;
        };

        let ranges = plan_ranges(provider, &plan.days);
        debug!(
            "Polling {} for {} subscribers over {} ranges",
            plan.pair,
            plan.subscribers,
            ranges.len()
        );

        match refresh_pair(&self.ctx, provider, &guard, &ranges, today).await {
            Ok(outcome) => PairOutcome::Polled(outcome.events),
            Err(e) => {
                error!("Failed to poll {}: {}", plan.pair, e);
                PairOutcome::Failed
            }
        }
    }
}
