//! portal-throttle
//!
//! Advisory, in-memory token-bucket throttling for client portal actions,
//! with a TOML-configured action table, Prometheus metrics and a small CLI
//! for replaying call sequences.

pub mod config;
pub mod metrics;
pub mod rate_limit;

pub use config::Config;
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
