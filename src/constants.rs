//! # Constants
//!
//! Default values shared across the adapter runtime and the scaler framework.

use std::time::Duration;

/// Default port for the HTTP server (external metrics, prometheus metrics, probes)
pub const DEFAULT_SERVER_PORT: u16 = 9443;

/// Default ceiling on any single backend HTTP request made by a scaler.
/// A `ScaledObject` can tighten this per trigger but never widen it.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Default activation threshold when a trigger does not configure one.
/// Activity is `value > threshold`, strictly.
pub const DEFAULT_ACTIVATION_THRESHOLD: f64 = 0.0;

/// Fallback metric value reported when a backend returns no data
pub const DEFAULT_EMPTY_RESPONSE_VALUE: f64 = 0.0;

/// Prefix of every metric identifier exposed to the orchestrator:
/// `s<trigger-index>-<trigger-type>-<qualifier>`
pub const METRIC_NAME_INDEX_PREFIX: &str = "s";

/// API group served by the external-metrics endpoint
pub const EXTERNAL_METRICS_API_GROUP: &str = "external.metrics.k8s.io";

/// API version served by the external-metrics endpoint
pub const EXTERNAL_METRICS_API_VERSION: &str = "v1beta1";
