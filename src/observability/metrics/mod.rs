//! # Metrics Module
//!
//! Prometheus metrics for monitoring the adapter, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `scaler_metrics` - Per-scaler metrics (metric values, errors, latency)
//! - `adapter_metrics` - External-metrics endpoint metrics (requests, outcomes)

pub mod adapter_metrics;
pub mod registry;
pub mod scaler_metrics;

// Re-export all public functions for backward compatibility
pub use adapter_metrics::*;
pub use registry::*;
pub use scaler_metrics::*;
