//! # Scaler Metrics
//!
//! Per-scaler instrumentation: the metric values handed to the HPA, query
//! latency, and an error counter keyed by error kind. One value observation
//! and (on failure) one error count is emitted per scaler invocation;
//! emission never fails a query.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{GaugeVec, HistogramVec, IntCounterVec};
use std::sync::LazyLock;

static SCALER_METRIC_VALUE: LazyLock<GaugeVec> = LazyLock::new(|| {
    GaugeVec::new(
        prometheus::Opts::new(
            "autoscaler_scaler_metrics_value",
            "Latest metric value produced by a scaler invocation",
        ),
        &[
            "scaler_type",
            "namespace",
            "scaled_object",
            "trigger_index",
            "metric",
        ],
    )
    .expect("Failed to create SCALER_METRIC_VALUE metric - this should never happen")
});

static SCALER_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "autoscaler_scaler_errors_total",
            "Total number of scaler invocation errors by error kind",
        ),
        &[
            "scaler_type",
            "namespace",
            "scaled_object",
            "trigger_index",
            "metric",
            "error_kind",
        ],
    )
    .expect("Failed to create SCALER_ERRORS_TOTAL metric - this should never happen")
});

static SCALER_METRICS_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "autoscaler_scaler_metrics_latency_seconds",
            "Duration of scaler metric queries in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        &["scaler_type", "namespace", "scaled_object"],
    )
    .expect("Failed to create SCALER_METRICS_LATENCY metric - this should never happen")
});

/// Register scaler metrics with the registry
pub(crate) fn register_scaler_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SCALER_METRIC_VALUE.clone()))?;
    REGISTRY.register(Box::new(SCALER_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SCALER_METRICS_LATENCY.clone()))?;
    Ok(())
}

// Public functions for scaler metrics

/// Record the value one scaler produced for one metric
pub fn record_scaler_metric_value(
    scaler_type: &str,
    namespace: &str,
    scaled_object: &str,
    trigger_index: usize,
    metric: &str,
    value: f64,
) {
    SCALER_METRIC_VALUE
        .with_label_values(&[
            scaler_type,
            namespace,
            scaled_object,
            &trigger_index.to_string(),
            metric,
        ])
        .set(value);
}

/// Count one failed scaler invocation with its error kind
pub fn increment_scaler_errors(
    scaler_type: &str,
    namespace: &str,
    scaled_object: &str,
    trigger_index: usize,
    metric: &str,
    error_kind: &str,
) {
    SCALER_ERRORS_TOTAL
        .with_label_values(&[
            scaler_type,
            namespace,
            scaled_object,
            &trigger_index.to_string(),
            metric,
            error_kind,
        ])
        .inc();
}

/// Observe the latency of one scaler metric query
pub fn observe_scaler_latency(scaler_type: &str, namespace: &str, scaled_object: &str, seconds: f64) {
    SCALER_METRICS_LATENCY
        .with_label_values(&[scaler_type, namespace, scaled_object])
        .observe(seconds);
}
