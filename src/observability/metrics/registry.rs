//! # Metrics Registry
//!
//! Prometheus metrics registry setup and registration.

use anyhow::Result;
use prometheus::{Registry, TextEncoder};
use std::sync::LazyLock;

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Register all metrics with the Prometheus registry
///
/// This function registers all metrics from all sub-modules.
/// Prometheus Registry::register() takes ownership (Box<dyn Collector>),
/// so we clone the metrics. Since Prometheus metrics internally use Arc,
/// cloning is cheap (just increments a reference count).
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    // Register scaler metrics
    super::scaler_metrics::register_scaler_metrics()?;

    // Register adapter metrics
    super::adapter_metrics::register_adapter_metrics()?;

    Ok(())
}

/// Encode the registry in the Prometheus text exposition format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn export_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&REGISTRY.gather())?)
}
