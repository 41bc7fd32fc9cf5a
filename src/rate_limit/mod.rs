//! Rate Limiting Module
//!
//! Advisory, in-memory token-bucket throttling for repeated client actions
//! (message sends, lead creation, uploads) keyed by an arbitrary string such
//! as `"sendMessage:user_42"`.
//!
//! # Features
//!
//! - Continuous (fractional) refill, no burst at window boundaries
//! - Lazily created per-key buckets with independent state
//! - Named action table so call sites don't hardcode thresholds
//! - Capacity cap and idle sweeps to bound memory
//! - Session glue: denial notices and a logout hook
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              ActionThrottle                  │
//! │   (action table lookup, notices, logout)     │
//! ├──────────────────────────────────────────────┤
//! │               RateLimiter                    │
//! │   (config, clock, metrics, sweeper task)     │
//! ├──────────────────────────────────────────────┤
//! │   BucketStore: key → Bucket (RwLock)         │
//! └──────────────────────────────────────────────┘
//! ```

pub mod bucket;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod limiter;
pub mod session;
pub mod store;

#[cfg(test)]
mod proptests;

pub use bucket::{Bucket, BucketStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ActionLimit, RateLimitConfig};
pub use dashboard::LimiterSnapshot;
pub use error::RateLimitError;
pub use limiter::{action_key, RateLimitDecision, RateLimiter};
pub use session::{denial_message, ActionThrottle, Notifier, TracingNotifier};
pub use store::BucketStore;
