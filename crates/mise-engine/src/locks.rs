//! # Lock Tables
//!
//! One async mutex per key, created on first use. The ledger keys by
//! `(tenant, branch, item)`; the cost service keys by tenant.
//!
//! A ledger call locks every key it touches before it opens its database
//! transaction. Keys are deduplicated and taken in sorted order, so two
//! calls over overlapping item sets can never wait on each other in a cycle.
//!
//! ```text
//! reserve(o1: cheese, bun)   ──► lock bun ──► lock cheese ──► tx ...
//! consume(o2: bun, cheese)   ──► lock bun (waits) ...
//! ```
//!
//! Entries nobody holds or waits on are pruned once the table grows past
//! [`PRUNE_THRESHOLD`].

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use mise_core::StockKey;

/// Table size that triggers a prune on the next acquire.
pub const PRUNE_THRESHOLD: usize = 4_096;

/// Lazily populated table of per-key mutexes.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
    prune_threshold: usize,
}

/// Per-stock-row locks used by the ledger.
pub type StockLocks = KeyedLocks<StockKey>;

/// Guards for a set of keys; dropping it releases them all.
#[derive(Debug)]
pub struct LockSet<K = StockKey> {
    keys: Vec<K>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl<K: Ord> LockSet<K> {
    /// Keys held, in acquisition order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn holds(&self, key: &K) -> bool {
        self.keys.binary_search(key).is_ok()
    }
}

impl<K: Eq + Hash> Default for KeyedLocks<K> {
    fn default() -> Self {
        KeyedLocks {
            locks: DashMap::new(),
            prune_threshold: PRUNE_THRESHOLD,
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        KeyedLocks {
            locks: DashMap::new(),
            prune_threshold,
        }
    }

    /// Locks every key, in sorted order.
    pub async fn acquire<I>(&self, keys: I) -> LockSet<K>
    where
        I: IntoIterator<Item = K>,
    {
        if self.locks.len() > self.prune_threshold {
            self.prune();
        }

        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            // Clone the Arc out so the shard lock is not held across the await.
            let mutex = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(mutex.lock_owned().await);
        }

        LockSet { keys, _guards: guards }
    }

    /// Drops entries that no guard or waiter references. Returns how many.
    ///
    /// Holders and waiters keep a clone of the entry's `Arc`, so a count of
    /// one means only the table knows about it.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        let pruned = before.saturating_sub(self.locks.len());
        if pruned > 0 {
            debug!(pruned, remaining = self.locks.len(), "Pruned idle lock entries");
        }
        pruned
    }

    /// Number of keys currently in the table.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(item: &str) -> StockKey {
        StockKey::new("t1", None, item)
    }

    #[tokio::test]
    async fn test_keys_are_sorted_and_deduplicated() {
        let locks = StockLocks::new();
        let set = locks.acquire(vec![key("cheese"), key("bun"), key("cheese")]).await;

        assert_eq!(set.keys(), &[key("bun"), key("cheese")]);
        assert!(set.holds(&key("bun")));
        assert!(!set.holds(&key("tomato")));
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_sets_serialize() {
        let locks = Arc::new(StockLocks::new());
        let first = locks.acquire(vec![key("cheese")]).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _set = locks.acquire(vec![key("bun"), key("cheese")]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_disjoint_sets_do_not_block() {
        let locks = StockLocks::new();
        let _cheese = locks.acquire(vec![key("cheese")]).await;
        let other = tokio::time::timeout(Duration::from_millis(100), locks.acquire(vec![key("bun")])).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_entries() {
        let locks = StockLocks::new();
        let held = locks.acquire(vec![key("cheese")]).await;
        drop(locks.acquire(vec![key("bun"), key("tomato")]).await);
        assert_eq!(locks.len(), 3);

        assert_eq!(locks.prune(), 2);
        assert_eq!(locks.len(), 1);

        // The surviving entry still excludes other callers.
        let blocked = tokio::time::timeout(Duration::from_millis(20), locks.acquire(vec![key("cheese")])).await;
        assert!(blocked.is_err());
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_table_is_pruned_past_threshold() {
        let locks = KeyedLocks::<String>::with_prune_threshold(4);
        for n in 0..10 {
            drop(locks.acquire(vec![format!("tenant-{n}")]).await);
        }
        assert!(locks.len() <= 5);
    }
}
