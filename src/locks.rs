use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::keys::CacheKey;

/// Per-key async mutexes serialising read-modify-write of a cache entry within this process.
///
/// Idle locks are dropped after a while. A lock evicted while held only loses its serialising effect for the writers
/// that come after; every single write stays self-consistent.
///
/// Next to the locks lives the mutation epoch. Invalidation advances it before touching any view, and a fill only
/// writes back what it read from the store if the epoch didn't move meanwhile.
pub(crate) struct KeyLocks {
    locks: Cache<CacheKey, Arc<Mutex<()>>>,
    epoch: AtomicU64,
}

impl KeyLocks {
    pub(crate) fn new(max_locks: u64) -> Self {
        Self {
            locks: Cache::builder()
                .max_capacity(max_locks)
                .time_to_idle(Duration::from_secs(60))
                .build(),
            epoch: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn advance(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) async fn lock(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let mutex = self.locks.get_with(key.clone(), || Arc::new(Mutex::new(())));
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::count_key;
    use crate::types::View;

    #[tokio::test]
    async fn same_key_is_serialised() {
        let locks = KeyLocks::new(16);
        let key = count_key(&View::ItemsAll);
        let guard = locks.lock(&key).await;
        assert!(locks.locks.get(&key).is_some_and(|m| m.try_lock().is_err()));
        drop(guard);
        assert!(locks.locks.get(&key).is_some_and(|m| m.try_lock().is_ok()));
    }

    #[test]
    fn epoch_only_moves_forward() {
        let locks = KeyLocks::new(16);
        let seen = locks.epoch();
        locks.advance();
        assert!(locks.epoch() > seen);
    }
}
