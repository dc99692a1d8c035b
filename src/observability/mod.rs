//! # Observability
//!
//! Prometheus instrumentation for the adapter and the scalers it drives.

pub mod metrics;
