//! Main entry point for the campsite availability engine.
//! Wires the store, provider adapters and notifier together, runs the
//! background loops and serves the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use campground_scan::{AdhocScraper, MemoryStore, PairLocks, ScanContext, Store};
use notification_services::{ChatClient, LogChatClient, Notifier, WebhookChatClient};
use postgres::PgStore;
use postgres::database::*;
use providers::http::build_client;
use providers::{ProviderOptions, ProviderRegistry};
use web_handlers::*;

mod config;
mod scan_manager;

use config::AppConfig;
use scan_manager::ScanManager;

/// Lock lifetime; a crashed holder blocks a pair no longer than this
const PAIR_LOCK_TTL: Duration = Duration::from_secs(10 * 60);

async fn create_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    let Some(database_url) = &config.database_url else {
        log::warn!("⚠️ DATABASE_URL not set, using the in-memory store");
        return Ok(Arc::new(
            MemoryStore::new().with_log_retention(config.digest_interval),
        ));
    };

    let pool = create_connection_pool(database_url, config.database_max_connections)
        .await
        .context("Failed to create database pool")?;
    log::info!("🗃️ Database pool created successfully");

    test_connection(&pool)
        .await
        .context("Database connection test failed")?;
    run_migrations(&pool)
        .await
        .context("Failed to apply migrations")?;

    Ok(Arc::new(PgStore::new(pool)))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting campsite availability engine...");

    let store = create_store(&config).await?;

    let client = build_client(&config.http)?;
    let registry = ProviderRegistry::from_enabled(
        &client,
        &config.enabled_providers,
        &ProviderOptions {
            ridb_api_key: config.ridb_api_key.clone(),
            request_delay: config.request_delay(),
        },
    )?;
    log::info!("🏕️ Providers enabled: {}", registry.names().join(", "));

    let chat: Arc<dyn ChatClient> = match &config.chat_webhook_url {
        Some(url) => {
            log::info!("💬 Delivering notifications to the chat webhook");
            Arc::new(WebhookChatClient::new(client.clone(), url.clone()))
        }
        None => {
            log::warn!("⚠️ CHAT_WEBHOOK_URL not set, notifications will only be logged");
            Arc::new(LogChatClient)
        }
    };
    let notifier = Notifier::start(chat, config.notifier.clone());

    let ctx = ScanContext::new(
        store,
        Arc::new(registry),
        notifier,
        PairLocks::new(PAIR_LOCK_TTL),
        config.request_delay(),
    );
    let scraper = AdhocScraper::new(ctx.clone(), config.adhoc.clone());

    let mut manager = ScanManager::new(ctx.clone());
    manager.start(&config);

    log::info!("🌐 Server will be available at: http://{}", config.bind_addr);

    // returns once Ctrl+C has stopped the server
    let served = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(ctx.clone()))
            .app_data(web::Data::new(scraper.clone()))
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .route(
                        "/adhoc/{provider}/{campground_id}",
                        web::get().to(get_adhoc_status),
                    )
                    .route(
                        "/adhoc/{provider}/{campground_id}",
                        web::post().to(request_adhoc_scrape),
                    )
                    .service(
                        web::scope("/admin/sync")
                            .route(
                                "/{provider}/campgrounds",
                                web::post().to(sync_provider_campgrounds),
                            )
                            .route(
                                "/{provider}/campsites",
                                web::post().to(sync_provider_campsites),
                            ),
                    ),
            )
            .route("/health", web::get().to(health))
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("Failed to bind {}", config.bind_addr))?
    .run()
    .await;

    manager.stop().await;
    log::info!("👋 Shut down cleanly");

    served.context("HTTP server failed")
}
