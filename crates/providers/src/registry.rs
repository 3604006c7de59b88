use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::error::ProviderError;
use crate::provider::Provider;
use crate::recreation_gov::{RECREATION_GOV, RecGovClient};
use crate::reserve_california::{RESERVE_CALIFORNIA, ReserveCaliforniaClient};

/// Every adapter key this build knows how to construct
pub const KNOWN_PROVIDERS: [&str; 2] = [RECREATION_GOV, RESERVE_CALIFORNIA];

/// Lookup table from provider key to adapter
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn Provider>>,
}

/// Per-adapter construction options
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// RIDB api key for recreation.gov catalog calls
    pub ridb_api_key: Option<String>,
    /// Pause between consecutive upstream calls of one adapter
    pub request_delay: std::time::Duration,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the adapters named in `enabled` on top of one shared client.
    ///
    /// Fails with `UnknownProvider` for any name this build does not ship.
    pub fn from_enabled(
        client: &Client,
        enabled: &[String],
        options: &ProviderOptions,
    ) -> Result<Self, ProviderError> {
        let mut registry = Self::new();

        for name in enabled {
            match name.trim() {
                RECREATION_GOV => registry.register(Arc::new(
                    RecGovClient::new(client.clone(), options.ridb_api_key.clone())
                        .with_request_delay(options.request_delay),
                )),
                RESERVE_CALIFORNIA => registry.register(Arc::new(
                    ReserveCaliforniaClient::new(client.clone())
                        .with_request_delay(options.request_delay),
                )),
                other => return Err(ProviderError::UnknownProvider(other.to_string())),
            }
        }

        info!("Registered providers: {:?}", registry.names());
        Ok(registry)
    }

    /// Adds or replaces an adapter under its own key
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name(), provider);
    }

    /// Resolves an adapter by key
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    /// Registered keys in sorted order
    pub fn names(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }
}
