use tokio::sync::watch;
use tokio::task::JoinHandle;

use campground_scan::{CatalogSync, DigestJob, ScanContext, ScanExecutor};

use crate::config::AppConfig;

/// Owns the background loops: polling, per-provider catalog sync and the digest
pub struct ScanManager {
    ctx: ScanContext,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ScanManager {
    /// Creates a manager with no loops running
    pub fn new(ctx: ScanContext) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawns every loop
    pub fn start(&mut self, config: &AppConfig) {
        log::info!("Starting background jobs");

        let executor = ScanExecutor::new(self.ctx.clone(), config.executor.clone());
        let rx = self.shutdown.subscribe();
        self.handles
            .push(tokio::spawn(async move { executor.run(rx).await }));

        for provider in self.ctx.registry.names() {
            let sync = CatalogSync::new(self.ctx.clone(), provider, config.catalog_sync_interval);
            let rx = self.shutdown.subscribe();
            self.handles
                .push(tokio::spawn(async move { sync.run(rx).await }));
        }

        let digest = DigestJob::new(
            self.ctx.clone(),
            config.digest_channel.clone(),
            config.digest_interval,
        );
        let rx = self.shutdown.subscribe();
        self.handles
            .push(tokio::spawn(async move { digest.run(rx).await }));

        log::info!("{} background jobs running", self.handles.len());
    }

    /// Signals every loop, waits for them to finish their current pass,
    /// then drains the notification queue
    pub async fn stop(&mut self) {
        log::info!("Stopping background jobs");
        let _ = self.shutdown.send(true);

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                log::error!("Background job ended abnormally: {}", e);
            }
        }

        self.ctx.notifier.shutdown().await;
        log::info!("Background jobs stopped");
    }
}
