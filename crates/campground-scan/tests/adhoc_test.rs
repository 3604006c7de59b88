//! Integration tests for on-demand refreshes.

use std::sync::Arc;
use std::time::Duration;

use campground_scan::{
    AdhocConfig, AdhocOutcome, AdhocScraper, AdhocStatus, MemoryStore, PairKey, PairLocks,
    ScanContext, ScanError, Subscription,
};
use chrono::{Days, Utc};
use httpmock::prelude::*;
use notification_services::{Notifier, NotifierConfig};
use providers::http::{HttpConfig, RetryPolicy, build_client};
use providers::{ProviderError, ProviderRegistry, RecGovClient, RecGovEndpoints};
use serde_json::json;
use uuid::Uuid;

mod common;
use common::{FAKE, Harness, RecordingChat, Script};

fn scraper(harness: &Harness) -> AdhocScraper {
    AdhocScraper::new(harness.ctx.clone(), AdhocConfig::default())
}

#[tokio::test]
async fn test_second_request_inside_cooldown_is_debounced() {
    let harness = Harness::new();
    let scraper = scraper(&harness);

    let first = scraper.request(FAKE, "T", "U1").await.unwrap();
    let second = scraper.request(FAKE, "T", "U2").await.unwrap();

    match first {
        AdhocOutcome::Processed(request) => {
            assert_eq!(request.status, AdhocStatus::Completed);
            assert!(request.finished_at.is_some());
        }
        other => panic!("expected processed, got {other:?}"),
    }
    match second {
        AdhocOutcome::Debounced { latest } => {
            assert_eq!(latest.unwrap().requester_id, "U1");
        }
        other => panic!("expected debounced, got {other:?}"),
    }
    assert_eq!(harness.store.inner.adhoc_requests().await.len(), 1);
    assert!(!scraper.can_request(FAKE, "T").await.unwrap());
    assert!(scraper.can_request(FAKE, "other").await.unwrap());
}

#[tokio::test]
async fn test_request_after_cooldown_creates_a_new_row() {
    let harness = Harness::new();
    let scraper = AdhocScraper::new(
        harness.ctx.clone(),
        AdhocConfig {
            cooldown: Duration::from_millis(50),
            ..Default::default()
        },
    );

    scraper.request(FAKE, "T", "U1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    let again = scraper.request(FAKE, "T", "U2").await.unwrap();

    let AdhocOutcome::Processed(request) = again else {
        panic!("expected processed, got {again:?}");
    };
    // the finished first request is superseded rather than kept forever
    let kept = harness.store.inner.adhoc_requests().await;
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, request.id);
    assert_eq!(kept[0].requester_id, "U2");
}

#[tokio::test]
async fn test_adhoc_refresh_notifies_like_the_scheduler() {
    let harness = Harness::new();
    let today = Utc::now().date_naive();
    let opening = today.checked_add_days(Days::new(3)).unwrap();
    harness
        .subscribe(
            "U1",
            "T",
            Some("C36"),
            today,
            today.checked_add_days(Days::new(10)).unwrap(),
        )
        .await;
    harness
        .provider
        .set("T", Script::Cells(vec![("C36", opening, true)]));

    scraper(&harness).request(FAKE, "T", "U9").await.unwrap();

    let delivered = harness.delivered().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, "U1");
    assert!(delivered[0].1.contains("C36"));
}

#[tokio::test]
async fn test_upstream_failure_marks_request_failed() {
    let harness = Harness::new();
    harness.provider.set("T", Script::Fail);

    let outcome = scraper(&harness).request(FAKE, "T", "U1").await.unwrap();

    match outcome {
        AdhocOutcome::Processed(request) => assert_eq!(request.status, AdhocStatus::Failed),
        other => panic!("expected processed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lock_wait_is_bounded_by_timeout() {
    let harness = Harness::new();
    let scraper = AdhocScraper::new(
        harness.ctx.clone(),
        AdhocConfig {
            timeout: Duration::from_millis(200),
            ..Default::default()
        },
    );
    let _held = harness
        .ctx
        .locks
        .try_acquire(&PairKey::new(FAKE, "T"))
        .unwrap();

    let outcome = scraper.request(FAKE, "T", "U1").await.unwrap();

    match outcome {
        AdhocOutcome::Processed(request) => assert_eq!(request.status, AdhocStatus::Failed),
        other => panic!("expected processed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_provider_is_rejected_before_any_row() {
    let harness = Harness::new();
    let result = scraper(&harness).request("hipcamp", "T", "U1").await;

    assert!(matches!(
        result,
        Err(ScanError::Provider(ProviderError::UnknownProvider(_)))
    ));
    assert!(harness.store.inner.adhoc_requests().await.is_empty());
}

#[tokio::test]
async fn test_adhoc_against_recreation_gov_month_endpoint() {
    let server = MockServer::start_async().await;
    let today = Utc::now().date_naive();
    let opening = today.checked_add_days(Days::new(1)).unwrap();
    let mut availabilities = serde_json::Map::new();
    availabilities.insert(
        format!("{}T00:00:00Z", opening.format("%Y-%m-%d")),
        json!("Available"),
    );
    let body = json!({
        "campsites": {
            "1001": {"campsite_id": "1001", "site": "C36", "availabilities": availabilities}
        }
    });
    let month = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/camps/availability/campground/232447/month");
            then.status(200).json_body(body.clone());
        })
        .await;

    let adapter = RecGovClient::with_endpoints(
        build_client(&HttpConfig::default()).unwrap(),
        None,
        RecGovEndpoints {
            internal_base_url: server.url("/api"),
            ridb_base_url: server.url("/ridb"),
            public_base_url: "https://www.recreation.gov".to_string(),
        },
    )
    .with_retry_policy(RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
    })
    .with_request_delay(Duration::ZERO);

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(adapter));

    let store = Arc::new(MemoryStore::new());
    store
        .insert_subscription(Subscription {
            id: Uuid::new_v4(),
            user_id: "U1".to_string(),
            provider: "recreationdotgov".to_string(),
            campground_id: "232447".to_string(),
            site_filter: Some("*".to_string()),
            start_date: today,
            end_date: opening,
            active: true,
            created_at: Utc::now(),
        })
        .await;

    let chat = Arc::new(RecordingChat::default());
    let notifier = Notifier::start(chat.clone(), NotifierConfig::default());
    let ctx = ScanContext::new(
        store.clone(),
        Arc::new(registry),
        notifier.clone(),
        PairLocks::new(Duration::from_secs(60)),
        Duration::ZERO,
    );

    let outcome = AdhocScraper::new(ctx, AdhocConfig::default())
        .request("recreationdotgov", "232447", "U1")
        .await
        .unwrap();
    notifier.shutdown().await;

    assert!(month.hits_async().await >= 1);
    match outcome {
        AdhocOutcome::Processed(request) => assert_eq!(request.status, AdhocStatus::Completed),
        other => panic!("expected processed, got {other:?}"),
    }
    let messages = chat.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("https://www.recreation.gov/camping/campsites/1001"));
}
