//! Per-correlation-key concurrency control.
//!
//! The persist → evaluate → forward → mark-sent region must run under
//! mutual exclusion per key: two concurrent deliveries for the same key
//! could otherwise both observe the trigger and both create a remote
//! agent session, splitting one logical conversation in two. Distinct
//! keys never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use cm_domain::error::{Error, Result};
use cm_domain::CorrelationKey;

/// Manages per-key locks.
///
/// Each correlation key maps to a `Semaphore(1)`. Acquiring the permit
/// gives exclusive access for one segment's full handling; waiters are
/// served in FIFO order, preserving per-key delivery order.
pub struct KeyLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for KeyLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for a key, waiting until the current holder
    /// finishes. The permit auto-releases on drop.
    pub async fn acquire(&self, key: &CorrelationKey) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned()
            .await
            .map_err(|_| Error::Other(format!("key lock closed for {key}")))
    }

    /// Number of tracked keys (for monitoring).
    pub fn key_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Remove locks for keys that aren't actively held.
    ///
    /// An entry is kept while its permit is out *or* while any acquirer
    /// still holds a clone of the semaphore: `acquire` clones the `Arc`
    /// out of the map before awaiting the permit, and evicting the entry
    /// in that window would let a later `acquire` mint a fresh semaphore
    /// for the same key, breaking mutual exclusion.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0 || Arc::strong_count(sem) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(session: &str) -> CorrelationKey {
        CorrelationKey::new(session, "agent-1")
    }

    #[tokio::test]
    async fn sequential_access() {
        let map = KeyLockMap::new();

        let permit1 = map.acquire(&key("s1")).await.unwrap();
        drop(permit1);

        let permit2 = map.acquire(&key("s1")).await.unwrap();
        drop(permit2);
    }

    #[tokio::test]
    async fn different_keys_concurrent() {
        let map = Arc::new(KeyLockMap::new());

        let p1 = map.acquire(&key("s1")).await.unwrap();
        let p2 = map.acquire(&key("s2")).await.unwrap();

        // Both held simultaneously.
        assert_eq!(map.key_count(), 2);

        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn same_key_waits() {
        let map = Arc::new(KeyLockMap::new());
        let map2 = map.clone();

        let p1 = map.acquire(&key("s1")).await.unwrap();

        let handle = tokio::spawn(async move {
            let _p2 = map2.acquire(&key("s1")).await.unwrap();
            42
        });

        // Give the waiter a moment to queue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        drop(p1);

        let result = handle.await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn prune_drops_only_idle_keys() {
        let map = KeyLockMap::new();

        let held = map.acquire(&key("busy")).await.unwrap();
        drop(map.acquire(&key("idle")).await.unwrap());

        map.prune_idle();
        assert_eq!(map.key_count(), 1);

        drop(held);
    }

    #[tokio::test]
    async fn prune_retains_keys_with_inflight_acquirers() {
        let map = KeyLockMap::new();
        drop(map.acquire(&key("s1")).await.unwrap());

        // An acquire that has cloned the semaphore out of the map but
        // not yet obtained the permit. Pruning must not evict the entry,
        // or a concurrent acquire would get a fresh semaphore and both
        // callers would hold the "same" lock at once.
        let inflight = map.locks.lock().get("s1:agent-1").unwrap().clone();

        map.prune_idle();
        assert_eq!(map.key_count(), 1);

        drop(inflight);
        map.prune_idle();
        assert_eq!(map.key_count(), 0);
    }
}
