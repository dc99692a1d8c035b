//! # Custom Resource Definitions
//!
//! CRD types for the autoscaler metrics adapter.
//!
//! A `ScaledObject` declares which signal sources ("triggers") drive a
//! workload's replica count. The controller watches these resources,
//! resolves trigger authentication, and hands the factory one
//! [`ScalerConfig`] per trigger; this module owns the resource schema and
//! that conversion.

mod status;

use std::collections::BTreeMap;
use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::scaler::config::{MetricType, PodIdentity, ScalerConfig};
use crate::scaler::error::ScalerError;

pub use status::{Condition, ScaledObjectStatus};

/// ScaledObject Custom Resource Definition
///
/// Declares the triggers that produce scaling metrics for one workload.
///
/// # Example
///
/// ```yaml
/// apiVersion: autoscaling.microscaler.io/v1alpha1
/// kind: ScaledObject
/// metadata:
///   name: orders-api
///   namespace: default
///   labels:
///     scaledobject.autoscaler/name: orders-api
/// spec:
///   scaleTargetRef:
///     name: orders-api
///   triggers:
///     - type: queue
///       metadata:
///         queueName: orders
///         targetQueueSize: "10"
///       authenticationRef:
///         name: rabbitmq-connection
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ScaledObject",
    group = "autoscaling.microscaler.io",
    version = "v1alpha1",
    namespaced,
    status = "ScaledObjectStatus",
    shortname = "so",
    printcolumn = r#"{"name":"Target", "type":"string", "jsonPath":".spec.scaleTargetRef.name"}, {"name":"Triggers", "type":"string", "jsonPath":".spec.triggers[*].type"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectSpec {
    /// The workload whose replica count the triggers drive
    pub scale_target_ref: ScaleTargetRef,
    /// How often the controller polls the triggers, in seconds
    #[serde(default)]
    pub polling_interval: Option<i32>,
    /// Lower replica bound enforced by the controller
    #[serde(default)]
    pub min_replica_count: Option<i32>,
    /// Upper replica bound enforced by the controller
    #[serde(default)]
    pub max_replica_count: Option<i32>,
    /// Signal sources; one scaler is constructed per entry
    pub triggers: Vec<TriggerSpec>,
}

/// Reference to the scalable workload
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    /// API version of the target, e.g. "apps/v1"
    #[serde(default = "default_target_api_version")]
    pub api_version: String,
    /// Kind of the target; anything with a scale subresource
    #[serde(default = "default_target_kind")]
    pub kind: String,
    /// Target name
    pub name: String,
}

/// One declared signal source
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    /// Trigger type tag, e.g. "queue", "prometheus", "cron"
    #[serde(rename = "type")]
    pub trigger_type: String,
    /// Optional display name for the trigger
    #[serde(default)]
    pub name: Option<String>,
    /// Metric target interpretation; defaults to AverageValue
    #[serde(default)]
    pub metric_type: Option<MetricType>,
    /// Serve cached samples between polls instead of querying the backend
    /// on every external-metrics request
    #[serde(default)]
    pub use_cached_metrics: bool,
    /// Type-specific trigger configuration
    pub metadata: BTreeMap<String, String>,
    /// Reference to the authentication object the controller resolves into
    /// auth params
    #[serde(default)]
    pub authentication_ref: Option<AuthenticationRef>,
}

/// Reference to a trigger authentication resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRef {
    /// Name of the authentication resource
    pub name: String,
    /// Kind of the authentication resource; defaults to the namespaced kind
    #[serde(default)]
    pub kind: Option<String>,
}

fn default_target_api_version() -> String {
    "apps/v1".to_string()
}

fn default_target_kind() -> String {
    "Deployment".to_string()
}

/// Authentication material the controller resolved for one trigger:
/// secret-derived params, the scale target's environment, and the pod
/// identity in effect
#[derive(Clone, Default)]
pub struct ResolvedTriggerAuth {
    /// Secret-derived auth params
    pub auth_params: BTreeMap<String, String>,
    /// Environment of the scale target
    pub resolved_env: BTreeMap<String, String>,
    /// Pod identity descriptor
    pub pod_identity: PodIdentity,
}

impl std::fmt::Debug for ResolvedTriggerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secret-derived values stay out of logs.
        f.debug_struct("ResolvedTriggerAuth")
            .field("pod_identity", &self.pod_identity)
            .finish_non_exhaustive()
    }
}

impl ScaledObject {
    /// Convert this resource into one [`ScalerConfig`] per trigger.
    ///
    /// `resolve_auth` is the controller's seam: it turns each trigger's
    /// `authenticationRef` into resolved auth material. The trigger index is
    /// the position in the trigger list, which namespaces metric names
    /// across triggers of the same type.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::MissingRequiredField`] when the trigger list
    /// is empty and [`ScalerError::BadValue`] for anonymous triggers.
    pub fn scaler_configs<F>(
        &self,
        global_http_timeout: Duration,
        mut resolve_auth: F,
    ) -> Result<Vec<ScalerConfig>, ScalerError>
    where
        F: FnMut(&TriggerSpec) -> ResolvedTriggerAuth,
    {
        if self.spec.triggers.is_empty() {
            return Err(ScalerError::missing_field("triggers"));
        }

        let name = self
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let namespace = self
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        let mut configs = Vec::with_capacity(self.spec.triggers.len());
        for (trigger_index, trigger) in self.spec.triggers.iter().enumerate() {
            if trigger.trigger_type.is_empty() {
                return Err(ScalerError::bad_value(
                    "triggers.type",
                    format!("trigger {trigger_index} has no type"),
                ));
            }
            let auth = resolve_auth(trigger);
            configs.push(ScalerConfig {
                trigger_type: trigger.trigger_type.clone(),
                trigger_index,
                scalable_object_name: name.clone(),
                scalable_object_namespace: namespace.clone(),
                scalable_object_type: "ScaledObject".to_string(),
                trigger_metadata: trigger.metadata.clone(),
                auth_params: auth.auth_params,
                resolved_env: auth.resolved_env,
                pod_identity: auth.pod_identity,
                global_http_timeout,
                metric_type: trigger.metric_type,
                as_metric_source: false,
                use_cached_metrics: trigger.use_cached_metrics,
                trigger_unique_key: format!("{namespace}/{name}:{trigger_index}"),
            });
        }
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaled_object(yaml: &str) -> ScaledObject {
        serde_yaml::from_str(yaml).expect("manifest parses")
    }

    const ORDERS_MANIFEST: &str = r"
apiVersion: autoscaling.microscaler.io/v1alpha1
kind: ScaledObject
metadata:
  name: orders-api
  namespace: default
spec:
  scaleTargetRef:
    name: orders-api
  triggers:
    - type: queue
      metadata:
        queueName: orders
        targetQueueSize: '10'
    - type: queue
      metadata:
        queueName: orders
        targetQueueSize: '10'
";

    #[test]
    fn test_manifest_roundtrip() {
        let object = scaled_object(ORDERS_MANIFEST);
        assert_eq!(object.spec.scale_target_ref.name, "orders-api");
        assert_eq!(object.spec.scale_target_ref.kind, "Deployment");
        assert_eq!(object.spec.triggers.len(), 2);
        assert_eq!(object.spec.triggers[0].trigger_type, "queue");
    }

    #[test]
    fn test_scaler_configs_index_by_position() {
        let object = scaled_object(ORDERS_MANIFEST);
        let configs = object
            .scaler_configs(Duration::from_secs(3), |_| ResolvedTriggerAuth::default())
            .unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].trigger_index, 0);
        assert_eq!(configs[1].trigger_index, 1);
        assert_eq!(configs[0].trigger_unique_key, "default/orders-api:0");
        assert_ne!(configs[0].trigger_unique_key, configs[1].trigger_unique_key);
    }

    #[test]
    fn test_empty_trigger_list_is_rejected() {
        let object = scaled_object(
            r"
apiVersion: autoscaling.microscaler.io/v1alpha1
kind: ScaledObject
metadata:
  name: empty
spec:
  scaleTargetRef:
    name: empty
  triggers: []
",
        );
        let err = object
            .scaler_configs(Duration::from_secs(3), |_| ResolvedTriggerAuth::default())
            .unwrap_err();
        assert_eq!(err.kind(), "missing-required-field");
    }

    #[test]
    fn test_auth_resolution_feeds_configs() {
        let object = scaled_object(ORDERS_MANIFEST);
        let configs = object
            .scaler_configs(Duration::from_secs(3), |_| ResolvedTriggerAuth {
                auth_params: [("connection".to_string(), "http://mq:15672".to_string())]
                    .into_iter()
                    .collect(),
                ..ResolvedTriggerAuth::default()
            })
            .unwrap();
        assert_eq!(
            configs[0].auth_params.get("connection").map(String::as_str),
            Some("http://mq:15672")
        );
    }
}
