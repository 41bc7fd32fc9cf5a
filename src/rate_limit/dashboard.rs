//! Limiter Snapshots
//!
//! Serializable point-in-time view of the bucket store for the CLI and for
//! whatever admin surface embeds the limiter.

use serde::{Deserialize, Serialize};

use super::bucket::BucketStats;

/// Snapshot of every tracked bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSnapshot {
    /// Timestamp of snapshot generation
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Whether rate limiting is enabled
    pub enabled: bool,

    /// Number of tracked keys
    pub tracked_keys: usize,

    /// Calls admitted across all buckets
    pub total_allowed: u64,

    /// Calls denied across all buckets
    pub total_denied: u64,

    /// Per-bucket statistics, sorted by key
    pub buckets: Vec<BucketStats>,
}

impl LimiterSnapshot {
    pub fn new(enabled: bool, buckets: Vec<BucketStats>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            enabled,
            tracked_keys: buckets.len(),
            total_allowed: buckets.iter().map(|b| b.allowed).sum(),
            total_denied: buckets.iter().map(|b| b.denied).sum(),
            buckets,
        }
    }

    /// Fraction of calls denied, 0.0 when nothing has been checked
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_allowed + self.total_denied;
        if total == 0 {
            0.0
        } else {
            self.total_denied as f64 / total as f64
        }
    }

    /// Up to `n` buckets with the most denials, most denied first
    pub fn most_throttled(&self, n: usize) -> Vec<&BucketStats> {
        let mut throttled: Vec<&BucketStats> =
            self.buckets.iter().filter(|b| b.denied > 0).collect();
        throttled.sort_by(|a, b| b.denied.cmp(&a.denied).then_with(|| a.key.cmp(&b.key)));
        throttled.truncate(n);
        throttled
    }
}
