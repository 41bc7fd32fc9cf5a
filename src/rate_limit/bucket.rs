//! Token Bucket
//!
//! Per-key bucket with continuous (fractional) refill. Every refill is
//! computed against the time of the previous call for the same key, and the
//! refill clock is moved to "now" whether or not the call is admitted.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Mutable state for one rate-limit key
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Currently available permits, `0 <= tokens <= limit`
    tokens: f64,

    /// Time of the last refill, milliseconds since epoch
    last_refill_ms: i64,

    /// Limit applied on the most recent call
    limit: u32,

    /// Window applied on the most recent call
    window: Duration,

    /// Calls admitted since the bucket was created
    allowed: u64,

    /// Calls denied since the bucket was created
    denied: u64,
}

impl Bucket {
    /// Create a bucket holding its full allowance
    pub fn full(limit: u32, window: Duration, now_ms: i64) -> Self {
        Self {
            tokens: f64::from(limit),
            last_refill_ms: now_ms,
            limit,
            window,
            allowed: 0,
            denied: 0,
        }
    }

    /// Top up tokens for the time elapsed since the previous call.
    ///
    /// A zero window refills to full; a zero limit pins the bucket at zero.
    /// Neither case panics.
    pub fn refill(&mut self, limit: u32, window: Duration, now_ms: i64) {
        let cap = f64::from(limit);
        let elapsed = now_ms.saturating_sub(self.last_refill_ms).max(0) as f64;
        let window_ms = window.as_secs_f64() * 1000.0;

        // 0/0 is NaN and f64::min discards NaN, so a zero window lands on `cap`.
        let refilled = self.tokens + (elapsed / window_ms) * cap;
        self.tokens = refilled.min(cap).max(0.0);

        if now_ms > self.last_refill_ms {
            self.last_refill_ms = now_ms;
        }
        self.limit = limit;
        self.window = window;
    }

    /// Refill, then spend one token if at least one is available
    pub fn try_take(&mut self, limit: u32, window: Duration, now_ms: i64) -> bool {
        self.refill(limit, window, now_ms);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.allowed += 1;
            true
        } else {
            self.denied += 1;
            false
        }
    }

    /// Whole tokens currently available. Does not refill.
    pub fn remaining(&self) -> u32 {
        self.tokens.floor() as u32
    }

    /// Time until one token is available at the current rate.
    ///
    /// `None` when the bucket never refills (zero limit).
    pub fn retry_after(&self) -> Option<Duration> {
        if self.tokens >= 1.0 {
            return Some(Duration::ZERO);
        }
        if self.limit == 0 {
            return None;
        }

        let needed = 1.0 - self.tokens;
        let wait_ns = (needed / f64::from(self.limit)) * self.window.as_nanos() as f64;
        Some(Duration::from_nanos(wait_ns.ceil() as u64))
    }

    /// Whether the bucket has been untouched for more than `ttl_windows` windows
    pub fn is_idle(&self, now_ms: i64, ttl_windows: u32) -> bool {
        let ttl_ms = self.window.as_secs_f64() * 1000.0 * f64::from(ttl_windows);
        let idle_ms = now_ms.saturating_sub(self.last_refill_ms).max(0) as f64;
        idle_ms > ttl_ms
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill_ms(&self) -> i64 {
        self.last_refill_ms
    }

    /// Snapshot of this bucket for dashboards
    pub fn stats(&self, key: &str) -> BucketStats {
        BucketStats {
            key: key.to_string(),
            limit: self.limit,
            window_ms: self.window.as_millis() as u64,
            remaining: self.remaining(),
            allowed: self.allowed,
            denied: self.denied,
            last_refill_ms: self.last_refill_ms,
        }
    }
}

/// Point-in-time view of a single bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    /// Rate-limit key
    pub key: String,

    /// Limit applied on the most recent call
    pub limit: u32,

    /// Window applied on the most recent call, in milliseconds
    pub window_ms: u64,

    /// Whole tokens available
    pub remaining: u32,

    /// Calls admitted
    pub allowed: u64,

    /// Calls denied
    pub denied: u64,

    /// Last refill, milliseconds since epoch
    pub last_refill_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_millis(1000);

    #[test]
    fn test_full_bucket() {
        let bucket = Bucket::full(3, SECOND, 0);
        assert_eq!(bucket.remaining(), 3);
        assert_eq!(bucket.retry_after(), Some(Duration::ZERO));
    }

    #[test]
    fn test_take_until_empty() {
        let mut bucket = Bucket::full(3, SECOND, 0);

        assert!(bucket.try_take(3, SECOND, 0));
        assert!(bucket.try_take(3, SECOND, 0));
        assert!(bucket.try_take(3, SECOND, 0));
        assert!(!bucket.try_take(3, SECOND, 0));
        assert_eq!(bucket.remaining(), 0);
    }

    #[test]
    fn test_fractional_refill() {
        let mut bucket = Bucket::full(10, SECOND, 0);
        for _ in 0..10 {
            assert!(bucket.try_take(10, SECOND, 0));
        }

        bucket.refill(10, SECOND, 250);
        assert!((bucket.tokens() - 2.5).abs() < 1e-9);
        assert_eq!(bucket.remaining(), 2);
    }

    #[test]
    fn test_refill_caps_at_limit() {
        let mut bucket = Bucket::full(5, SECOND, 0);
        assert!(bucket.try_take(5, SECOND, 0));

        bucket.refill(5, SECOND, 60_000);
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[test]
    fn test_denied_call_still_moves_refill_clock() {
        let mut bucket = Bucket::full(1, SECOND, 0);
        assert!(bucket.try_take(1, SECOND, 0));

        assert!(!bucket.try_take(1, SECOND, 400));
        assert_eq!(bucket.last_refill_ms(), 400);
        assert!((bucket.tokens() - 0.4).abs() < 1e-9);

        assert!(!bucket.try_take(1, SECOND, 800));
        assert!((bucket.tokens() - 0.8).abs() < 1e-9);

        assert!(bucket.try_take(1, SECOND, 1_100));
    }

    #[test]
    fn test_clock_going_backwards() {
        let mut bucket = Bucket::full(2, SECOND, 5_000);
        assert!(bucket.try_take(2, SECOND, 5_000));

        bucket.refill(2, SECOND, 1_000);
        assert_eq!(bucket.last_refill_ms(), 5_000);
        assert_eq!(bucket.tokens(), 1.0);
    }

    #[test]
    fn test_zero_window_always_full() {
        let mut bucket = Bucket::full(2, Duration::ZERO, 0);
        for _ in 0..10 {
            assert!(bucket.try_take(2, Duration::ZERO, 0));
        }
        assert_eq!(bucket.remaining(), 1);
    }

    #[test]
    fn test_zero_limit_always_denies() {
        let mut bucket = Bucket::full(0, SECOND, 0);
        assert!(!bucket.try_take(0, SECOND, 0));
        assert!(!bucket.try_take(0, SECOND, 10_000));
        assert_eq!(bucket.remaining(), 0);
        assert_eq!(bucket.retry_after(), None);
    }

    #[test]
    fn test_lowering_limit_caps_tokens() {
        let mut bucket = Bucket::full(10, SECOND, 0);
        assert!(bucket.try_take(3, SECOND, 0));
        assert_eq!(bucket.remaining(), 2);
    }

    #[test]
    fn test_retry_after() {
        let mut bucket = Bucket::full(4, SECOND, 0);
        for _ in 0..4 {
            bucket.try_take(4, SECOND, 0);
        }
        // One token takes a quarter of the window at 4 per second
        assert_eq!(bucket.retry_after(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_sub_millisecond_window() {
        let window = Duration::from_micros(500);
        let mut bucket = Bucket::full(2, window, 0);

        let results: Vec<bool> = (0..5).map(|_| bucket.try_take(2, window, 0)).collect();
        assert_eq!(results, vec![true, true, false, false, false]);
        assert_eq!(bucket.retry_after(), Some(Duration::from_micros(250)));

        // One millisecond is two full windows
        assert!(bucket.try_take(2, window, 1));
        assert_eq!(bucket.remaining(), 1);
        assert!(!bucket.is_idle(2, 3));
        assert!(bucket.is_idle(3, 3));
    }

    #[test]
    fn test_is_idle() {
        let bucket = Bucket::full(1, SECOND, 0);
        assert!(!bucket.is_idle(3_000, 3));
        assert!(bucket.is_idle(3_001, 3));
    }

    #[test]
    fn test_stats() {
        let mut bucket = Bucket::full(2, SECOND, 0);
        bucket.try_take(2, SECOND, 0);
        bucket.try_take(2, SECOND, 0);
        bucket.try_take(2, SECOND, 0);

        let stats = bucket.stats("sendMessage:user-1");
        assert_eq!(stats.key, "sendMessage:user-1");
        assert_eq!(stats.allowed, 2);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.window_ms, 1000);
    }
}
