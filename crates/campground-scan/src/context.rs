use std::sync::Arc;
use std::time::Duration;

use notification_services::Notifier;
use providers::ProviderRegistry;

use crate::locks::PairLocks;
use crate::store::Store;

/// Shared handles every job needs, built once at startup
#[derive(Clone)]
pub struct ScanContext {
    /// Source of truth for subscriptions, snapshots, catalogs and adhoc state
    pub store: Arc<dyn Store>,
    /// Provider adapters by key
    pub registry: Arc<ProviderRegistry>,
    /// Outbound chat queue
    pub notifier: Notifier,
    /// Per-pair mutual exclusion
    pub locks: PairLocks,
    /// Pause between consecutive upstream calls of one job
    pub request_delay: Duration,
}

impl ScanContext {
    /// Bundles the shared handles
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ProviderRegistry>,
        notifier: Notifier,
        locks: PairLocks,
        request_delay: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
            locks,
            request_delay,
        }
    }
}
