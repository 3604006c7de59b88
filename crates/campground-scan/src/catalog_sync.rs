use std::time::Duration;

use providers::http::polite_pause;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::context::ScanContext;
use crate::scan_types::{ScanError, SyncReport};

/// Campground rows written per store call
const UPSERT_CHUNK: usize = 200;

/// Refreshes campground metadata for one provider.
///
/// `failed` counts entries in chunks the store refused.
pub async fn sync_campgrounds(ctx: &ScanContext, provider_name: &str) -> Result<SyncReport, ScanError> {
    let provider = ctx.registry.get(provider_name)?;
    info!("Syncing campground catalog for {}", provider_name);

    let entries = provider.fetch_catalog().await?;
    let mut report = SyncReport::default();

    for chunk in entries.chunks(UPSERT_CHUNK) {
        match ctx.store.upsert_campgrounds(chunk).await {
            Ok(written) => report.synced += written,
            Err(e) => {
                error!(
                    "Failed to store {} campgrounds for {}: {}",
                    chunk.len(),
                    provider_name,
                    e
                );
                report.failed += chunk.len();
            }
        }
    }

    info!(
        "Campground sync for {} done: {} synced, {} failed",
        provider_name, report.synced, report.failed
    );
    Ok(report)
}

/// Refreshes site metadata for every known campground of one provider.
///
/// `synced` counts sites written, `failed` counts campgrounds whose sites
/// could not be fetched or stored.
pub async fn sync_campsites(ctx: &ScanContext, provider_name: &str) -> Result<SyncReport, ScanError> {
    let provider = ctx.registry.get(provider_name)?;
    let campground_ids = ctx.store.campground_ids(provider_name).await?;
    info!(
        "Syncing campsites for {} campgrounds of {}",
        campground_ids.len(),
        provider_name
    );

    let mut report = SyncReport::default();
    for (index, campground_id) in campground_ids.iter().enumerate() {
        if index > 0 {
            polite_pause(ctx.request_delay).await;
        }

        let sites = match provider.fetch_site_catalog(campground_id).await {
            Ok(sites) => sites,
            Err(e) => {
                warn!(
                    "Failed to fetch campsites for {}/{}: {}",
                    provider_name, campground_id, e
                );
                report.failed += 1;
                continue;
            }
        };

        match ctx.store.upsert_campsites(&sites).await {
            Ok(written) => {
                debug!("Stored {} sites for {}/{}", written, provider_name, campground_id);
                report.synced += written;
            }
            Err(e) => {
                error!(
                    "Failed to store campsites for {}/{}: {}",
                    provider_name, campground_id, e
                );
                report.failed += 1;
            }
        }
    }

    info!(
        "Campsite sync for {} done: {} sites synced, {} campgrounds failed",
        provider_name, report.synced, report.failed
    );
    Ok(report)
}

/// Periodic full catalog refresh for one provider, campgrounds then campsites
pub struct CatalogSync {
    ctx: ScanContext,
    provider: String,
    period: Duration,
}

impl CatalogSync {
    /// Creates the job for `provider`
    pub fn new(ctx: ScanContext, provider: impl Into<String>, period: Duration) -> Self {
        Self {
            ctx,
            provider: provider.into(),
            period,
        }
    }

    /// Runs one campgrounds-then-campsites pass
    pub async fn run_once(&self) -> Result<(SyncReport, SyncReport), ScanError> {
        let campgrounds = sync_campgrounds(&self.ctx, &self.provider).await?;
        let campsites = sync_campsites(&self.ctx, &self.provider).await?;
        Ok((campgrounds, campsites))
    }

    /// Syncs every `period` until `shutdown` flips, cancelling a pass in flight.
    ///
    /// The first pass runs at startup only when the provider has no catalog yet.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🚀 Starting catalog sync for {} every {:?}",
            self.provider, self.period
        );

        let empty = match self.ctx.store.campground_ids(&self.provider).await {
            Ok(ids) => ids.is_empty(),
            Err(e) => {
                warn!("Could not read catalog for {}: {}", self.provider, e);
                false
            }
        };
        let first = if empty {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.period
        };

        let mut ticker = interval_at(first, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            // an in-flight pass is abandoned on shutdown; upserts already made stay
            tokio::select! {
                result = self.run_once() => {
                    if let Err(e) = result {
                        error!("Catalog sync for {} failed: {}", self.provider, e);
                    }
                }
                _ = shutdown.changed() => {
                    warn!("Abandoning catalog sync for {} on shutdown", self.provider);
                    break;
                }
            }
        }

        info!("🛑 Catalog sync for {} stopped", self.provider);
    }
}
