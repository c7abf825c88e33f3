use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::types::{
    Account, AccountBlocks, AccountTransactions, BlockchainStatus, SuggestedFee,
    TransactionFilter,
};

// ==============================================================================
// Cache Entry
// ==============================================================================

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Whether a failed refill may fall back to an expired entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Reject,
    Allow,
}

// ==============================================================================
// TTL Cache
// ==============================================================================

/// Per-key memoisation with a time-to-live and single-flight refill.
///
/// Concurrent lookups of the same missing or expired key wait on one
/// refill instead of each hitting the network.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    inflight: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value, if it is still fresh.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            fetched_at: Instant::now(),
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Return the fresh value for `key`, or run `fetch` once to refill it.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: K,
        staleness: Staleness,
        fetch: F,
    ) -> Result<V, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CoreError>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }

        let guard = self.key_guard(&key).await;
        let _refilling = guard.lock().await;

        // Another caller may have refilled while we waited on the guard.
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }

        match fetch().await {
            Ok(value) => {
                debug!(cache = self.name, ?key, "cache refilled");
                self.insert(key, value.clone()).await;
                Ok(value)
            }
            Err(err) => {
                if staleness == Staleness::Allow {
                    if let Some(entry) = self.entries.read().await.get(&key) {
                        warn!(cache = self.name, ?key, error = %err, "refill failed, serving stale entry");
                        return Ok(entry.value.clone());
                    }
                }
                Err(err)
            }
        }
    }

    async fn key_guard(&self, key: &K) -> Arc<Mutex<()>> {
        self.inflight
            .lock()
            .await
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop entries older than `factor × ttl` and idle refill guards.
    ///
    /// Returns the number of entries removed.
    pub async fn sweep(&self, factor: u32) -> usize {
        let max_age = self.ttl.saturating_mul(factor.max(1));
        let now = Instant::now();

        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, entry| now.saturating_duration_since(entry.fetched_at) < max_age);
            before - entries.len()
        };

        self.inflight
            .lock()
            .await
            .retain(|_, guard| Arc::strong_count(guard) > 1);

        if removed > 0 {
            debug!(cache = self.name, removed, "cache swept");
        }
        removed
    }
}

// ==============================================================================
// Client Caches
// ==============================================================================

/// The per-query caches shared by the client and the rebuilder.
pub struct Caches {
    pub accounts: TtlCache<String, Account>,
    pub transactions: TtlCache<(String, TransactionFilter), AccountTransactions>,
    pub blocks: TtlCache<String, AccountBlocks>,
    pub status: TtlCache<(), BlockchainStatus>,
    pub fees: TtlCache<(), SuggestedFee>,
}

impl Caches {
    pub fn new(ttl: Duration) -> Self {
        Self {
            accounts: TtlCache::new("accounts", ttl),
            transactions: TtlCache::new("transactions", ttl),
            blocks: TtlCache::new("blocks", ttl),
            status: TtlCache::new("status", ttl),
            fees: TtlCache::new("fees", ttl),
        }
    }

    pub async fn sweep(&self, factor: u32) -> usize {
        self.accounts.sweep(factor).await
            + self.transactions.sweep(factor).await
            + self.blocks.sweep(factor).await
            + self.status.sweep(factor).await
            + self.fees.sweep(factor).await
    }
}
