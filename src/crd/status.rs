//! # ScaledObject Status
//!
//! Status types for tracking trigger health and scaling state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of the ScaledObject resource
///
/// Tracks trigger readiness and the last scaling observations.
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Metric identifiers currently exposed for this object
    #[serde(default)]
    pub external_metric_names: Vec<String>,
    /// Whether any trigger currently reports the workload as active
    #[serde(default)]
    pub active: Option<bool>,
    /// Last time a trigger produced a metric value (RFC3339)
    #[serde(default)]
    pub last_active_time: Option<String>,
    /// Health of each trigger, keyed by metric identifier
    /// Values: Ready, Failing
    #[serde(default)]
    pub trigger_health: std::collections::BTreeMap<String, String>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
