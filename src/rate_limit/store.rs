//! Bucket Store
//!
//! In-memory registry of token buckets keyed by an opaque string. Buckets are
//! created lazily on first check and removed by `remove`, `clear`, idle
//! sweeps, or capacity eviction.
//!
//! Alongside the map the registry keeps an index ordered by refill time, so
//! capacity eviction finds the stalest bucket without scanning every key.
//! The `rate_limit_tracked_buckets` gauge is adjusted by the number of buckets
//! each registry adds or drops, so several stores add up instead of
//! overwriting each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::bucket::{Bucket, BucketStats};
use super::limiter::RateLimitDecision;
use crate::metrics;

/// Result of a store-level check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    /// Admission decision for the key
    pub decision: RateLimitDecision,

    /// Key evicted to make room for a new bucket, if any
    pub evicted: Option<String>,
}

#[derive(Debug, Default)]
struct Registry {
    buckets: HashMap<String, Bucket>,

    /// `(last_refill_ms, key)` for every bucket
    by_refill: BTreeSet<(i64, String)>,
}

impl Registry {
    fn remove(&mut self, key: &str) -> Option<Bucket> {
        let bucket = self.buckets.remove(key)?;
        self.by_refill.remove(&(bucket.last_refill_ms(), key.to_string()));
        metrics::add_tracked_buckets(-1);
        Some(bucket)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.by_refill.first()?.clone();
        self.remove(&key)?;
        Some(key)
    }

    fn clear(&mut self) -> usize {
        let count = self.buckets.len();
        self.buckets.clear();
        self.by_refill.clear();
        metrics::add_tracked_buckets(-(count as i64));
        count
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        metrics::add_tracked_buckets(-(self.buckets.len() as i64));
    }
}

/// In-memory bucket store
#[derive(Debug, Clone, Default)]
pub struct BucketStore {
    registry: Arc<RwLock<Registry>>,
}

impl BucketStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the bucket for `key`, refill it and try to take a
    /// token, all under a single write lock.
    ///
    /// With `max_keys` set, creating a new bucket at capacity first evicts
    /// the bucket with the oldest refill time.
    pub async fn check(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
        max_keys: Option<usize>,
    ) -> CheckOutcome {
        let mut registry = self.registry.write().await;

        let created = !registry.buckets.contains_key(key);
        let mut evicted = None;
        if created {
            if let Some(max) = max_keys {
                if max > 0 && registry.buckets.len() >= max {
                    evicted = registry.evict_oldest();
                }
            }
            metrics::add_tracked_buckets(1);
        }

        let Registry { buckets, by_refill } = &mut *registry;
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| {
            by_refill.insert((now_ms, key.to_string()));
            Bucket::full(limit, window, now_ms)
        });

        let before = bucket.last_refill_ms();
        let allowed = bucket.try_take(limit, window, now_ms);
        let after = bucket.last_refill_ms();
        if after != before {
            by_refill.remove(&(before, key.to_string()));
            by_refill.insert((after, key.to_string()));
        }

        let decision = RateLimitDecision {
            allowed,
            remaining: bucket.remaining(),
            retry_after: if allowed { None } else { bucket.retry_after() },
        };

        CheckOutcome { decision, evicted }
    }

    /// Whole tokens available for `key`, or 0 if it has no bucket
    pub async fn remaining(&self, key: &str) -> u32 {
        let registry = self.registry.read().await;
        registry.buckets.get(key).map(Bucket::remaining).unwrap_or(0)
    }

    /// Get a copy of a bucket if it exists
    pub async fn get(&self, key: &str) -> Option<Bucket> {
        let registry = self.registry.read().await;
        registry.buckets.get(key).cloned()
    }

    /// Remove a bucket, returning whether one existed
    pub async fn remove(&self, key: &str) -> bool {
        let mut registry = self.registry.write().await;
        registry.remove(key).is_some()
    }

    /// Remove every bucket, returning how many were dropped
    pub async fn clear(&self) -> usize {
        let mut registry = self.registry.write().await;
        registry.clear()
    }

    /// Drop buckets idle for more than `ttl_windows` of their own window
    pub async fn sweep_idle(&self, now_ms: i64, ttl_windows: u32) -> usize {
        let mut registry = self.registry.write().await;
        let idle: Vec<String> = registry
            .buckets
            .iter()
            .filter(|(_, bucket)| bucket.is_idle(now_ms, ttl_windows))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &idle {
            registry.remove(key);
        }
        idle.len()
    }

    /// Stats for every bucket, sorted by key
    pub async fn snapshot(&self) -> Vec<BucketStats> {
        let registry = self.registry.read().await;
        let mut stats: Vec<BucketStats> = registry
            .buckets
            .iter()
            .map(|(key, bucket)| bucket.stats(key))
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }

    /// Number of tracked keys
    pub async fn len(&self) -> usize {
        self.registry.read().await.buckets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.read().await.buckets.is_empty()
    }
}
