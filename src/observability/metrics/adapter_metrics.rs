//! # Adapter Metrics
//!
//! Metrics for the external-metrics endpoint: query counts by outcome and
//! end-to-end query latency.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

static ADAPTER_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "autoscaler_adapter_requests_total",
            "Total number of external-metrics queries by outcome",
        ),
        &["namespace", "metric", "outcome"],
    )
    .expect("Failed to create ADAPTER_REQUESTS_TOTAL metric - this should never happen")
});

static ADAPTER_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "autoscaler_adapter_request_duration_seconds",
            "Duration of external-metrics queries in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        &["namespace"],
    )
    .expect("Failed to create ADAPTER_REQUEST_DURATION metric - this should never happen")
});

/// Register adapter metrics with the registry
pub(crate) fn register_adapter_metrics() -> Result<()> {
    REGISTRY.register(Box::new(ADAPTER_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADAPTER_REQUEST_DURATION.clone()))?;
    Ok(())
}

// Public functions for adapter metrics

/// Count one external-metrics query with its outcome label
pub fn increment_adapter_requests(namespace: &str, metric: &str, outcome: &str) {
    ADAPTER_REQUESTS_TOTAL
        .with_label_values(&[namespace, metric, outcome])
        .inc();
}

/// Observe the end-to-end latency of one external-metrics query
pub fn observe_adapter_request_duration(namespace: &str, seconds: f64) {
    ADAPTER_REQUEST_DURATION
        .with_label_values(&[namespace])
        .observe(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_adapter_requests() {
        let labels = ["default", "s0-queue-orders", "success"];
        let before = ADAPTER_REQUESTS_TOTAL.with_label_values(&labels).get();
        increment_adapter_requests("default", "s0-queue-orders", "success");
        let after = ADAPTER_REQUESTS_TOTAL.with_label_values(&labels).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_adapter_request_duration() {
        observe_adapter_request_duration("default", 0.1);
        // Just verify it doesn't panic
    }
}
