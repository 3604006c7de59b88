/// Errors raised while talking to an upstream reservation system
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Rate limiting, 5xx, timeouts and network failures
    #[error("Transient upstream error: {0}")]
    Transient(String),

    /// Any other non-success status
    #[error("Upstream rejected request with HTTP {status}: {message}")]
    Permanent {
        /// HTTP status code returned by the upstream
        status: u16,
        /// Short description or response body excerpt
        message: String,
    },

    /// The upstream answered but the payload could not be decoded
    #[error("Malformed upstream payload: {0}")]
    Decode(String),

    /// No adapter is registered under this key
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The shared HTTP client could not be built
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl ProviderError {
    /// Whether a retry has a reasonable chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Maps a non-success HTTP status onto the error taxonomy
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = truncate(body, 200);
        if status.as_u16() == 429 || status.is_server_error() {
            ProviderError::Transient(format!("HTTP {} - {}", status, message))
        } else {
            ProviderError::Permanent {
                status: status.as_u16(),
                message,
            }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return ProviderError::Decode(e.to_string());
        }
        if let Some(status) = e.status() {
            return ProviderError::from_status(status, &e.to_string());
        }
        if e.is_builder() {
            return ProviderError::Client(e.to_string());
        }
        // timeouts, connect failures and dropped connections
        ProviderError::Transient(e.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Decode(e.to_string())
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
