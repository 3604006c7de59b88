use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::scan_types::PairKey;

const ACQUIRE_POLL: Duration = Duration::from_millis(100);

struct LockEntry {
    token: u64,
    acquired_at: Instant,
}

type LockTable = Arc<Mutex<HashMap<PairKey, LockEntry>>>;

fn lock_table(table: &LockTable) -> MutexGuard<'_, HashMap<PairKey, LockEntry>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory per-pair mutual exclusion with a TTL.
///
/// An entry older than the TTL is treated as abandoned and may be taken over.
#[derive(Clone)]
pub struct PairLocks {
    ttl: Duration,
    table: LockTable,
    next_token: Arc<AtomicU64>,
}

/// Held while a pair's fetch-diff-persist sequence runs; releases on drop
pub struct PairGuard {
    table: LockTable,
    key: PairKey,
    token: u64,
    deadline: tokio::time::Instant,
}

impl PairLocks {
    /// Creates an empty lock table
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            table: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Takes the lock if it is free or stale
    pub fn try_acquire(&self, key: &PairKey) -> Option<PairGuard> {
        let mut table = lock_table(&self.table);

        if let Some(entry) = table.get(key) {
            if entry.acquired_at.elapsed() < self.ttl {
                return None;
            }
            warn!("Taking over stale lock on {}", key);
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let acquired_at = Instant::now();
        table.insert(key.clone(), LockEntry { token, acquired_at });
        debug!("Locked {}", key);

        Some(PairGuard {
            table: self.table.clone(),
            key: key.clone(),
            token,
            deadline: tokio::time::Instant::from_std(acquired_at) + self.hold_limit(),
        })
    }

    /// Waits until the lock can be taken
    pub async fn acquire(&self, key: &PairKey) -> PairGuard {
        loop {
            if let Some(guard) = self.try_acquire(key) {
                return guard;
            }
            sleep(ACQUIRE_POLL).await;
        }
    }

    /// How long a holder may work under one guard: nine tenths of the TTL
    pub fn hold_limit(&self) -> Duration {
        self.ttl - self.ttl / 10
    }
}

impl PairGuard {
    /// The locked pair
    pub fn key(&self) -> &PairKey {
        &self.key
    }

    /// Instant by which work under this guard must be finished
    pub fn deadline(&self) -> tokio::time::Instant {
        self.deadline
    }
}

impl Drop for PairGuard {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        // a stale lock may have been taken over; only release our own entry
        if table.get(&self.key).is_some_and(|e| e.token == self.token) {
            table.remove(&self.key);
            debug!("Unlocked {}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PairKey {
        PairKey::new("recreationdotgov", "232447")
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let locks = PairLocks::new(Duration::from_secs(60));

        let guard = locks.try_acquire(&key()).unwrap();
        assert!(locks.try_acquire(&key()).is_none());
        assert!(locks.try_acquire(&PairKey::new("recreationdotgov", "1")).is_some());
        assert!(lock_table(&locks.table).contains_key(&key()));

        drop(guard);
        assert!(!lock_table(&locks.table).contains_key(&key()));
        assert!(locks.try_acquire(&key()).is_some());
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let locks = PairLocks::new(Duration::ZERO);

        let stale = locks.try_acquire(&key()).unwrap();
        let fresh = locks.try_acquire(&key()).unwrap();

        // dropping the stale guard must not release the new holder
        drop(stale);
        assert!(lock_table(&locks.table).contains_key(&key()));
        drop(fresh);
        assert!(!lock_table(&locks.table).contains_key(&key()));
    }

    #[tokio::test]
    async fn test_guard_deadline_comes_before_the_lock_goes_stale() {
        let locks = PairLocks::new(Duration::from_secs(60));
        let before = tokio::time::Instant::now();

        let guard = locks.try_acquire(&key()).unwrap();

        assert_eq!(locks.hold_limit(), Duration::from_secs(54));
        assert!(guard.deadline() >= before + locks.hold_limit());
        assert!(guard.deadline() < before + Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let locks = PairLocks::new(Duration::from_secs(60));
        let guard = locks.try_acquire(&key()).unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(&key()).await.key().clone() })
        };
        sleep(Duration::from_millis(150)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), key());
    }
}
