use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Desktop browser identity presented to every upstream
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Settings for the process-wide HTTP client
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Hard timeout for a whole request (default: 30 seconds)
    pub request_timeout: Duration,

    /// Timeout for establishing a connection (default: 10 seconds)
    pub connect_timeout: Duration,

    /// Idle connections kept per upstream host (default: 8)
    pub max_idle_per_host: usize,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_idle_per_host: 8,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

/// Builds the single connection-pooled client shared by all adapters
pub fn build_client(config: &HttpConfig) -> Result<Client, ProviderError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("DNT", HeaderValue::from_static("1"));

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .cookie_store(true)
        .pool_max_idle_per_host(config.max_idle_per_host)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| ProviderError::Client(e.to_string()))
}

/// Sends a request and decodes a JSON body, classifying failures
pub async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let url = response.url().clone();
    debug!("{} {}", status, url);

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        return Err(ProviderError::from_status(status, &body));
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::Decode(format!("{} from {}", e, url)))
}

/// Bounded retry with linear backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default: 3)
    pub max_attempts: u32,

    /// Delay before the second attempt; later attempts wait `base_delay * attempt`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Runs `op` until it succeeds, fails permanently, or runs out of attempts
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    label, attempt, policy.max_attempts, delay, e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sleeps for `base` plus up to 50% random jitter
pub async fn polite_pause(base: Duration) {
    if base.is_zero() {
        return;
    }
    let jitter_ms = rand::rng().random_range(0..=base.as_millis() as u64 / 2);
    sleep(base + Duration::from_millis(jitter_ms)).await;
}
