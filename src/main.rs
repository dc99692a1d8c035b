//! # Autoscaler Metrics Adapter
//!
//! Translates external signals into scaling metrics for the Kubernetes HPA.
//!
//! ## Overview
//!
//! This service provides event-driven autoscaling metrics by:
//!
//! 1. **Scaler construction** - Builds one scaler per declared trigger via the
//!    type registry, with validated typed metadata
//! 2. **External metrics** - Serves the external-metrics API surface the HPA
//!    queries, multiplexing across each workload's scalers
//! 3. **Push bridging** - Streams activity transitions from push-capable
//!    scalers (cron) without polling
//! 4. **Prometheus metrics** - Exposes per-scaler values, errors, and latency
//! 5. **Health probes** - HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use clap::Parser;
use tracing::info;

use autoscaler_metrics_adapter::runtime::initialization::{initialize, AdapterArgs};
use autoscaler_metrics_adapter::scaler::ScalerContext;

#[tokio::main]
async fn main() -> Result<()> {
    let args = AdapterArgs::parse();

    // Initialize the adapter runtime
    let init = initialize(args).await?;

    // Serve until the process is asked to stop
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // Stop push bridges first so their scalers' run loops exit, then close
    // every cached scaler.
    for bridge in init.bridges {
        bridge.stop().await;
    }
    let close_ctx = ScalerContext::background();
    for entry in init.cache.all() {
        for handle in &entry.scalers {
            if let Err(err) = handle.scaler.close(&close_ctx).await {
                tracing::warn!(
                    scaler_type = handle.scaler.scaler_type(),
                    error = %err,
                    "scaler close failed"
                );
            }
        }
    }

    init.server_handle.abort();
    init.activity_drain.abort();
    Ok(())
}
