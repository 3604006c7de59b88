use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use campground_scan::{AdhocConfig, ScanExecutorConfig};
use notification_services::NotifierConfig;
use providers::KNOWN_PROVIDERS;
use providers::http::HttpConfig;

/// Process configuration read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Pool size for the Postgres store
    pub database_max_connections: u32,
    /// Address the HTTP server listens on
    pub bind_addr: String,
    /// Provider keys to register
    pub enabled_providers: Vec<String>,
    /// RIDB key for recreation.gov catalog calls
    pub ridb_api_key: Option<String>,
    /// Chat webhook; messages are only logged when unset
    pub chat_webhook_url: Option<String>,
    /// Channel receiving the digest
    pub digest_channel: String,
    /// Time between digests
    pub digest_interval: Duration,
    /// Time between full catalog syncs
    pub catalog_sync_interval: Duration,
    /// Shared HTTP client settings
    pub http: HttpConfig,
    /// Polling loop settings
    pub executor: ScanExecutorConfig,
    /// On-demand refresh settings
    pub adhoc: AdhocConfig,
    /// Notification worker settings
    pub notifier: NotifierConfig,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let enabled_providers = match non_empty(&lookup, "ENABLED_PROVIDERS") {
            Some(list) => list
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            None => KNOWN_PROVIDERS.iter().map(|name| name.to_string()).collect(),
        };

        let request_delay = Duration::from_millis(parse_or(&lookup, "REQUEST_DELAY_MS", 250)?);

        Ok(Self {
            database_url: non_empty(&lookup, "DATABASE_URL"),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            bind_addr: non_empty(&lookup, "BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            enabled_providers,
            ridb_api_key: non_empty(&lookup, "RIDB_API_KEY"),
            chat_webhook_url: non_empty(&lookup, "CHAT_WEBHOOK_URL"),
            digest_channel: non_empty(&lookup, "DIGEST_CHANNEL")
                .unwrap_or_else(|| "general".to_string()),
            digest_interval: Duration::from_secs(
                parse_or(&lookup, "DIGEST_INTERVAL_HOURS", 24u64)? * 3600,
            ),
            catalog_sync_interval: Duration::from_secs(
                parse_or(&lookup, "CATALOG_SYNC_INTERVAL_HOURS", 168u64)? * 3600,
            ),
            http: HttpConfig {
                request_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 30)?),
                ..HttpConfig::default()
            },
            executor: ScanExecutorConfig {
                poll_interval: Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 300)?),
                provider_concurrency: parse_or(&lookup, "PROVIDER_CONCURRENCY", 4usize)?.max(1),
                request_delay,
            },
            adhoc: AdhocConfig {
                cooldown: Duration::from_secs(parse_or(&lookup, "ADHOC_COOLDOWN_SECS", 300)?),
                timeout: Duration::from_secs(parse_or(&lookup, "ADHOC_TIMEOUT_SECS", 120)?),
                horizon_days: parse_or(&lookup, "ADHOC_HORIZON_DAYS", 90)?,
            },
            notifier: NotifierConfig {
                workers: parse_or(&lookup, "NOTIFIER_WORKERS", 4usize)?.max(1),
                queue_capacity: parse_or(&lookup, "NOTIFIER_QUEUE", 1024usize)?.max(1),
                max_attempts: parse_or(&lookup, "NOTIFIER_MAX_ATTEMPTS", 3u32)?.max(1),
                ..NotifierConfig::default()
            },
        })
    }

    /// Pause between consecutive upstream calls
    pub fn request_delay(&self) -> Duration {
        self.executor.request_delay
    }
}
