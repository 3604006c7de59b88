//! Integration tests for catalog sync and the digest.

use std::time::Duration;

use campground_scan::{
    CatalogSync, ScanExecutor, ScanExecutorConfig, Store, SyncReport, send_digest,
    sync_campgrounds, sync_campsites,
};
use chrono::Utc;
use providers::CampgroundEntry;
use tokio::sync::watch;

mod common;
use common::{FAKE, Harness, Script, day};

fn campground(id: &str) -> CampgroundEntry {
    CampgroundEntry {
        provider: FAKE.to_string(),
        campground_id: id.to_string(),
        name: format!("Campground {}", id),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_catalog_sync_counts_synced_and_failed() {
    let harness = Harness::new();
    *harness.provider.catalog.lock().unwrap() =
        vec![campground("1"), campground("2"), campground("3")];
    harness
        .provider
        .failing_site_catalogs
        .lock()
        .unwrap()
        .push("2".to_string());

    let campgrounds = sync_campgrounds(&harness.ctx, FAKE).await.unwrap();
    let campsites = sync_campsites(&harness.ctx, FAKE).await.unwrap();

    assert_eq!(campgrounds, SyncReport { synced: 3, failed: 0 });
    assert_eq!(campsites, SyncReport { synced: 2, failed: 1 });
    assert_eq!(harness.store.inner.campsites().await.len(), 2);
}

#[tokio::test]
async fn test_catalog_loop_abandons_a_pass_on_shutdown() {
    let harness = Harness::new();
    *harness.provider.catalog.lock().unwrap() = vec![campground("1")];
    *harness.provider.catalog_delay.lock().unwrap() = Duration::from_secs(5);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = CatalogSync::new(harness.ctx.clone(), FAKE, Duration::from_secs(3600));
    let handle = tokio::spawn(async move { sync.run(shutdown_rx).await });

    // the empty catalog starts a pass right away
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();

    let stopped = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(stopped.is_ok(), "catalog loop kept running after shutdown");
    assert!(harness.store.campground_ids(FAKE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_of_unknown_provider_fails() {
    let harness = Harness::new();
    assert!(sync_campgrounds(&harness.ctx, "hipcamp").await.is_err());
}

#[tokio::test]
async fn test_digest_summarizes_recent_notifications() {
    let harness = Harness::new();
    harness
        .subscribe("U1", "T", None, day("2025-08-10"), day("2025-08-20"))
        .await;
    harness
        .subscribe("U2", "T", None, day("2025-08-10"), day("2025-08-20"))
        .await;
    harness.provider.set(
        "T",
        Script::Cells(vec![
            ("C36", day("2025-08-17"), true),
            ("C37", day("2025-08-18"), true),
        ]),
    );
    ScanExecutor::new(harness.ctx.clone(), ScanExecutorConfig::default())
        .run_cycle_for(day("2025-08-01"))
        .await
        .unwrap();

    let summary = send_digest(
        &harness.ctx,
        "general",
        chrono::Duration::hours(24),
        Utc::now() + chrono::Duration::seconds(1),
    )
    .await
    .unwrap();

    assert_eq!(summary.notifications_sent, 4);
    assert_eq!(summary.users_notified, 2);
    assert_eq!(summary.active_subscriptions, 2);
    assert_eq!(summary.top_campgrounds.len(), 1);
    assert_eq!(summary.top_campgrounds[0].notifications, 4);

    let delivered = harness.delivered().await;
    // one message per subscriber plus the digest
    assert_eq!(delivered.len(), 3);
    assert!(delivered.iter().any(|(to, text)| to == "#general" && text.contains("Notifications sent: 4")));
}
