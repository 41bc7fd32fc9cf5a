// Prometheus metrics for portal-throttle
//
// - Admission decisions by result (counter)
// - Tracked buckets across every limiter in the process (gauge)
// - Bucket removals by reason (counter)
//
// Keys are never used as labels; their cardinality is unbounded.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref RATE_LIMIT_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_decisions_total", "Rate limit checks by result"),
        &["result"]
    ).expect("Failed to create rate limit decisions metric");

    pub static ref RATE_LIMIT_TRACKED_BUCKETS: IntGauge = IntGauge::new(
        "rate_limit_tracked_buckets",
        "Number of keys currently holding a bucket"
    ).expect("Failed to create tracked buckets metric");

    pub static ref RATE_LIMIT_REMOVALS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_removals_total", "Buckets removed by reason"),
        &["reason"]
    ).expect("Failed to create bucket removals metric");
}

static INIT: Once = Once::new();

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let collectors: [Box<dyn prometheus::core::Collector>; 3] = [
            Box::new(RATE_LIMIT_DECISIONS_TOTAL.clone()),
            Box::new(RATE_LIMIT_TRACKED_BUCKETS.clone()),
            Box::new(RATE_LIMIT_REMOVALS_TOTAL.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!("Failed to register metric: {}", e);
            }
        }
    });
}

pub(crate) fn record_decision(allowed: bool) {
    let result = if allowed { "allowed" } else { "denied" };
    RATE_LIMIT_DECISIONS_TOTAL.with_label_values(&[result]).inc();
}

pub(crate) fn record_removals(reason: &str, count: usize) {
    if count > 0 {
        RATE_LIMIT_REMOVALS_TOTAL
            .with_label_values(&[reason])
            .inc_by(count as u64);
    }
}

/// Adjust the tracked-bucket gauge by the number of buckets created (positive)
/// or dropped (negative). Every store reports its own changes, so the gauge
/// is the total across all limiters in the process.
pub(crate) fn add_tracked_buckets(delta: i64) {
    RATE_LIMIT_TRACKED_BUCKETS.add(delta);
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    init();
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
