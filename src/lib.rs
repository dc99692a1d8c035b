//! # Autoscaler Metrics Adapter Library
//!
//! Event-driven autoscaling metrics provider: translates heterogeneous
//! external signals (queue depths, monitoring queries, cron schedules, HTTP
//! probes) into normalized external metrics the Kubernetes HPA consumes.
//!
//! ## Overview
//!
//! - `scaler` - the framework: contract, config resolver, typed metadata
//!   binder, cancellation context, factory, shared session cache
//! - `scalers` - concrete trigger implementations
//! - `adapter` - the external-metrics adapter and the push bridge
//! - `crd` - `ScaledObject` resource types and trigger-config assembly
//! - `observability` - Prometheus instrumentation
//! - `runtime` - process initialization and the HTTP server

pub mod adapter;
pub mod constants;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod scaler;
pub mod scalers;

// Re-export the framework surface for convenience
pub use adapter::{AdapterError, MetricsAdapter};
pub use scaler::{
    MetricReport, MetricSample, MetricSpec, MetricTarget, MetricType, PushScaler, Scaler,
    ScalerConfig, ScalerContext, ScalerError, SharedScaler,
};
