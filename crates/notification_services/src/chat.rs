use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::NotificationError;

/// Outbound chat transport
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends a direct message to one user
    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<(), NotificationError>;

    /// Posts a message to a shared channel
    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<(), NotificationError>;
}

/// Posts messages as JSON to a chat webhook
pub struct WebhookChatClient {
    client: Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    text: &'a str,
}

impl WebhookChatClient {
    /// Creates a webhook client sharing the process HTTP client
    pub fn new(client: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotificationError::Transient(e.to_string()))?;

        let status = response.status();
        debug!("Webhook responded with {}", status);

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(NotificationError::Transient(format!("HTTP {} - {}", status, body)))
        } else {
            Err(NotificationError::Rejected(format!("HTTP {} - {}", status, body)))
        }
    }
}

#[async_trait]
impl ChatClient for WebhookChatClient {
    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<(), NotificationError> {
        self.post(&WebhookPayload {
            user_id: Some(user_id),
            channel: None,
            text,
        })
        .await
    }

    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<(), NotificationError> {
        self.post(&WebhookPayload {
            user_id: None,
            channel: Some(channel),
            text,
        })
        .await
    }
}

/// Chat client that only logs, used when no webhook is configured
pub struct LogChatClient;

#[async_trait]
impl ChatClient for LogChatClient {
    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<(), NotificationError> {
        info!("💬 [to user {}]\n{}", user_id, text);
        Ok(())
    }

    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<(), NotificationError> {
        info!("💬 [#{}]\n{}", channel, text);
        Ok(())
    }
}
