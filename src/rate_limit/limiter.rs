//! Rate Limiter
//!
//! Entry point for callers. A `RateLimiter` is an explicit, cloneable handle
//! over a shared bucket store; the application shell constructs it with its
//! configuration and passes it to whatever needs throttling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::config::RateLimitConfig;
use super::dashboard::LimiterSnapshot;
use super::error::Result;
use super::store::BucketStore;
use crate::metrics;

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    /// Whether the call is permitted
    pub allowed: bool,

    /// Whole tokens left after this call
    pub remaining: u32,

    /// Time until a token is available (denied calls only; `None` if never)
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// Create an allowed decision
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
        }
    }

    /// Create a denied decision
    pub fn denied(remaining: u32, retry_after: Option<Duration>) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after,
        }
    }

    /// Decision returned while rate limiting is disabled
    pub fn unlimited() -> Self {
        Self::allowed(u32::MAX)
    }

    /// Retry hint rounded up to whole seconds
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|d| d.as_millis().div_ceil(1000) as u64)
    }
}

/// Build the conventional `"{action}:{subject}"` key
pub fn action_key(action: &str, subject: &str) -> String {
    format!("{}:{}", action, subject)
}

/// Token-bucket rate limiter keyed by arbitrary strings
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Configuration
    config: Arc<RwLock<RateLimitConfig>>,

    /// Bucket registry
    store: BucketStore,

    /// Time source
    clock: Arc<C>,
}

impl<C: Clock> Clone for RateLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl RateLimiter<SystemClock> {
    /// Create a limiter on the wall clock
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Create a disabled limiter (for testing)
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }
}

impl<C: Clock + 'static> RateLimiter<C> {
    /// Create a limiter reading time from `clock`
    pub fn with_clock(config: RateLimitConfig, clock: Arc<C>) -> Self {
        metrics::init();
        Self {
            config: Arc::new(RwLock::new(config)),
            store: BucketStore::new(),
            clock,
        }
    }

    /// Decide whether one more call for `key` is permitted at `limit` calls
    /// per `window`.
    ///
    /// The first call for a key starts from a full bucket. Refill is
    /// continuous and measured from the previous call for the same key,
    /// admitted or not. Degenerate arguments never panic: a zero limit always
    /// denies and a zero window always admits.
    pub async fn check(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.check_detailed(key, limit, window).await.allowed
    }

    /// Same as [`check`](Self::check) but reports remaining quota and a
    /// retry hint
    pub async fn check_detailed(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let (enabled, max_keys) = {
            let config = self.config.read().await;
            (config.enabled, config.max_keys)
        };
        if !enabled {
            return RateLimitDecision::unlimited();
        }

        let now_ms = self.clock.now_ms();
        let outcome = self
            .store
            .check(key, limit, window, now_ms, max_keys)
            .await;

        if let Some(evicted) = &outcome.evicted {
            debug!(evicted = %evicted, "Evicted bucket to stay within max_keys");
            metrics::record_removals("capacity", 1);
        }

        let decision = outcome.decision;
        metrics::record_decision(decision.allowed);
        if decision.allowed {
            debug!(key, remaining = decision.remaining, "Rate limit check passed");
        } else {
            debug!(
                key,
                retry_after_ms = decision.retry_after.map(|d| d.as_millis() as u64),
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Check a named action from the configured table for `subject`
    pub async fn check_action(&self, action: &str, subject: &str) -> Result<RateLimitDecision> {
        let limit = self.config.read().await.action(action)?;
        let key = action_key(action, subject);
        Ok(self.check_detailed(&key, limit.limit, limit.window()).await)
    }

    /// Whole tokens available for `key`, or 0 if it has never been checked.
    /// Does not refill or create a bucket.
    pub async fn remaining_quota(&self, key: &str) -> u32 {
        self.store.remaining(key).await
    }

    /// Forget `key`; its next check starts from a full bucket
    pub async fn reset(&self, key: &str) {
        if self.store.remove(key).await {
            debug!(key, "Reset rate limit bucket");
            metrics::record_removals("reset", 1);
        }
    }

    /// Forget every key, e.g. at logout
    pub async fn clear_all(&self) {
        let cleared = self.store.clear().await;
        info!("Cleared {} rate limit buckets", cleared);
        metrics::record_removals("clear", cleared);
    }

    /// Drop buckets idle for longer than the configured number of windows
    pub async fn sweep_idle(&self) -> usize {
        let ttl_windows = self.config.read().await.idle_ttl_windows;
        let swept = self.store.sweep_idle(self.clock.now_ms(), ttl_windows).await;
        if swept > 0 {
            info!("Swept {} idle rate limit buckets", swept);
        }
        metrics::record_removals("idle", swept);
        swept
    }

    /// Run [`sweep_idle`](Self::sweep_idle) on the configured interval until
    /// the returned task is aborted. The first sweep runs immediately.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let period = limiter
                .config
                .read()
                .await
                .sweep_interval()
                .max(Duration::from_secs(1));
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                limiter.sweep_idle().await;
            }
        })
    }

    /// Number of tracked keys
    pub async fn tracked_keys(&self) -> usize {
        self.store.len().await
    }

    /// Point-in-time view of every bucket
    pub async fn snapshot(&self) -> LimiterSnapshot {
        let enabled = self.config.read().await.enabled;
        LimiterSnapshot::new(enabled, self.store.snapshot().await)
    }

    /// Replace the configuration. Existing buckets are kept.
    pub async fn update_config(&self, config: RateLimitConfig) {
        let mut current = self.config.write().await;
        *current = config;
    }

    /// Get current configuration
    pub async fn config(&self) -> RateLimitConfig {
        self.config.read().await.clone()
    }

    /// Time source used by this limiter
    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }
}
