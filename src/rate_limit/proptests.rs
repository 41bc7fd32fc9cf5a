//! Property-Based Tests for the Rate Limiter
//!
//! - **Boundedness**: tokens stay within `[0, limit]` for any call sequence
//! - **Monotonic refill clock**: `last_refill_ms` never decreases
//! - **Key independence**: traffic on one key never changes another
//! - **Initial allowance**: exactly `limit` calls pass at a frozen clock

use proptest::prelude::*;
use std::time::Duration;

use super::bucket::Bucket;

// Helper: increasing-ish call times, with occasional backwards steps
fn arb_deltas() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-50i64..5_000, 1..200)
}

proptest! {
    #[test]
    fn prop_tokens_bounded(
        limit in 0u32..50,
        window_ms in 0u64..120_000,
        deltas in arb_deltas(),
    ) {
        let window = Duration::from_millis(window_ms);
        let mut now = 1_000_000i64;
        let mut bucket = Bucket::full(limit, window, now);

        for delta in deltas {
            now += delta;
            bucket.try_take(limit, window, now);
            prop_assert!(bucket.tokens() >= 0.0);
            prop_assert!(bucket.tokens() <= f64::from(limit));
            prop_assert!(bucket.remaining() <= limit);
        }
    }

    #[test]
    fn prop_refill_clock_monotonic(
        limit in 1u32..20,
        window_ms in 1u64..10_000,
        deltas in arb_deltas(),
    ) {
        let window = Duration::from_millis(window_ms);
        let mut now = 0i64;
        let mut bucket = Bucket::full(limit, window, now);
        let mut last = bucket.last_refill_ms();

        for delta in deltas {
            now += delta;
            bucket.try_take(limit, window, now);
            prop_assert!(bucket.last_refill_ms() >= last);
            last = bucket.last_refill_ms();
        }
    }

    #[test]
    fn prop_initial_allowance(limit in 1u32..100, window_ms in 1u64..100_000) {
        let window = Duration::from_millis(window_ms);
        let mut bucket = Bucket::full(limit, window, 0);

        for _ in 0..limit {
            prop_assert!(bucket.try_take(limit, window, 0));
        }
        prop_assert!(!bucket.try_take(limit, window, 0));
    }

    #[test]
    fn prop_key_independence(
        calls_on_a in 0usize..50,
        limit in 1u32..10,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let clock = std::sync::Arc::new(super::clock::ManualClock::new(0));
            let limiter = super::limiter::RateLimiter::with_clock(
                super::config::RateLimitConfig::default(),
                clock,
            );
            let window = Duration::from_secs(60);

            for _ in 0..calls_on_a {
                limiter.check("a", limit, window).await;
            }
            assert!(limiter.check("b", limit, window).await);
            assert_eq!(limiter.remaining_quota("b").await, limit - 1);
        });
    }
}
