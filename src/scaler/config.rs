//! # Scaler Configuration
//!
//! The per-trigger configuration record handed to the factory, plus the
//! primitive lookups every scaler builds on. Precedence is fixed in one
//! place: auth params win over trigger metadata, which wins over
//! env-indirection. The three maps are read-only for the lifetime of the
//! config; lookups copy values out instead of mutating in place.

use std::collections::BTreeMap;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::scaler::error::ScalerError;

/// Suffix marking an env-indirection key in trigger metadata:
/// `passwordFromEnv: DB_PW` resolves `password` from `resolved_env["DB_PW"]`
pub const FROM_ENV_SUFFIX: &str = "FromEnv";

/// How the metric target handed to the HPA is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MetricType {
    /// Target is a per-replica average
    AverageValue,
    /// Target is a workload-wide value
    Value,
    /// Resource utilization; not expressible for external metrics and
    /// rejected at scaler construction
    Utilization,
}

/// Pod identity provider used to acquire cloud credentials without static keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PodIdentityProvider {
    /// No pod identity; credentials come from auth params
    #[default]
    None,
    /// AWS IAM role bound to the workload's service account
    Aws,
    /// GCP Workload Identity
    Gcp,
    /// Azure Managed Identity
    Azure,
    /// Azure Workload Identity
    AzureWorkload,
}

/// Identity descriptor: provider variant plus optional identity id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodIdentity {
    /// Which identity plane issues the credentials
    #[serde(default)]
    pub provider: PodIdentityProvider,
    /// Provider-specific identity id (role ARN, client id)
    #[serde(default)]
    pub identity_id: Option<String>,
}

impl PodIdentity {
    /// True when no pod identity is configured
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.provider == PodIdentityProvider::None
    }
}

/// Everything the factory needs to construct one scaler for one trigger.
///
/// Built by the controller from a `ScaledObject` trigger entry plus resolved
/// authentication; immutable once constructed. Exactly one scaler is bound
/// to each config.
#[derive(Clone)]
pub struct ScalerConfig {
    /// Logical trigger type tag, e.g. `queue`
    pub trigger_type: String,
    /// Position within the workload's trigger list; namespaces metric names
    /// across multiple triggers of the same type
    pub trigger_index: usize,
    /// Name of the owning scalable workload
    pub scalable_object_name: String,
    /// Namespace of the owning scalable workload
    pub scalable_object_namespace: String,
    /// Kind of the owning object, e.g. `ScaledObject`
    pub scalable_object_type: String,
    /// Raw trigger metadata from the `ScaledObject` trigger entry
    pub trigger_metadata: BTreeMap<String, String>,
    /// Secret-derived values resolved by the controller
    pub auth_params: BTreeMap<String, String>,
    /// Environment of the scale target, for `<key>FromEnv` indirection
    pub resolved_env: BTreeMap<String, String>,
    /// Cloud identity descriptor
    pub pod_identity: PodIdentity,
    /// Hard cap on per-request latency of the scaler's HTTP client
    pub global_http_timeout: Duration,
    /// Metric target type requested by the trigger; `None` defaults to
    /// [`MetricType::AverageValue`]
    pub metric_type: Option<MetricType>,
    /// The scaler only feeds a composite and must not require a threshold
    pub as_metric_source: bool,
    /// The controller serves cached samples between polls for this trigger
    pub use_cached_metrics: bool,
    /// Opaque key for shared cloud-SDK session caching
    pub trigger_unique_key: String,
}

impl std::fmt::Debug for ScalerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Auth params and the resolved environment stay out of logs.
        f.debug_struct("ScalerConfig")
            .field("trigger_type", &self.trigger_type)
            .field("trigger_index", &self.trigger_index)
            .field("scalable_object_name", &self.scalable_object_name)
            .field("scalable_object_namespace", &self.scalable_object_namespace)
            .field("trigger_metadata", &self.trigger_metadata)
            .field("pod_identity", &self.pod_identity)
            .field("metric_type", &self.metric_type)
            .field("trigger_unique_key", &self.trigger_unique_key)
            .finish_non_exhaustive()
    }
}

impl ScalerConfig {
    /// Auth param if non-empty, else trigger metadata if non-empty, else a
    /// missing-required-field error naming the key. This ordering lets
    /// operators override configuration with secrets without schema changes.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::MissingRequiredField`] when neither source has
    /// a non-empty value.
    pub fn get_from_auth_or_meta(&self, key: &str) -> Result<String, ScalerError> {
        if let Some(value) = non_empty(self.auth_params.get(key)) {
            return Ok(value.to_string());
        }
        if let Some(value) = non_empty(self.trigger_metadata.get(key)) {
            return Ok(value.to_string());
        }
        Err(ScalerError::missing_field(key))
    }

    /// Trigger metadata value, erroring when absent or empty
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::MissingRequiredField`] when the key is absent.
    pub fn get_from_meta(&self, key: &str) -> Result<String, ScalerError> {
        non_empty(self.trigger_metadata.get(key))
            .map(ToString::to_string)
            .ok_or_else(|| ScalerError::missing_field(key))
    }

    /// Auth param value, erroring when absent or empty
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::MissingRequiredField`] when the key is absent.
    pub fn get_from_auth(&self, key: &str) -> Result<String, ScalerError> {
        non_empty(self.auth_params.get(key))
            .map(ToString::to_string)
            .ok_or_else(|| ScalerError::missing_field(key))
    }

    /// Env-indirection lookup: when trigger metadata names `<key>FromEnv`,
    /// the value comes from the resolved environment. Returns `Ok(None)` when
    /// no indirection is declared; a declared-but-missing variable is an
    /// error, not a fall-through.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::MissingRequiredField`] citing `key` when the
    /// named environment variable is absent.
    pub fn get_from_env_indirection(&self, key: &str) -> Result<Option<String>, ScalerError> {
        let indirection_key = format!("{key}{FROM_ENV_SUFFIX}");
        let Some(var_name) = non_empty(self.trigger_metadata.get(&indirection_key)) else {
            return Ok(None);
        };
        match non_empty(self.resolved_env.get(var_name)) {
            Some(value) => Ok(Some(value.to_string())),
            None => Err(ScalerError::missing_field(key)),
        }
    }

    /// Metric target type with the empty default applied and Utilization
    /// rejected, per the external-metrics contract.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::BadValue`] for [`MetricType::Utilization`].
    pub fn resolved_metric_type(&self) -> Result<MetricType, ScalerError> {
        match self.metric_type {
            None => Ok(MetricType::AverageValue),
            Some(MetricType::Utilization) => Err(ScalerError::bad_value(
                "metricType",
                "Utilization is not supported for external metrics; use AverageValue or Value",
            )),
            Some(other) => Ok(other),
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_config() -> ScalerConfig {
        ScalerConfig {
            trigger_type: "test".to_string(),
            trigger_index: 0,
            scalable_object_name: "orders-api".to_string(),
            scalable_object_namespace: "default".to_string(),
            scalable_object_type: "ScaledObject".to_string(),
            trigger_metadata: BTreeMap::new(),
            auth_params: BTreeMap::new(),
            resolved_env: BTreeMap::new(),
            pod_identity: PodIdentity::default(),
            global_http_timeout: Duration::from_secs(3),
            metric_type: None,
            as_metric_source: false,
            use_cached_metrics: false,
            trigger_unique_key: "test-key".to_string(),
        }
    }

    #[test]
    fn test_auth_wins_over_metadata() {
        let mut config = test_config();
        config
            .trigger_metadata
            .insert("connection".to_string(), "from-meta".to_string());
        config
            .auth_params
            .insert("connection".to_string(), "from-auth".to_string());

        assert_eq!(config.get_from_auth_or_meta("connection").unwrap(), "from-auth");
    }

    #[test]
    fn test_empty_auth_falls_through_to_metadata() {
        let mut config = test_config();
        config
            .auth_params
            .insert("connection".to_string(), String::new());
        config
            .trigger_metadata
            .insert("connection".to_string(), "from-meta".to_string());

        assert_eq!(config.get_from_auth_or_meta("connection").unwrap(), "from-meta");
    }

    #[test]
    fn test_missing_everywhere_names_the_key() {
        let config = test_config();
        let err = config.get_from_auth_or_meta("connection").unwrap_err();
        assert!(matches!(
            err,
            ScalerError::MissingRequiredField { ref field } if field == "connection"
        ));
    }

    #[test]
    fn test_env_indirection_resolves_variable() {
        let mut config = test_config();
        config
            .trigger_metadata
            .insert("passwordFromEnv".to_string(), "DB_PW".to_string());
        config
            .resolved_env
            .insert("DB_PW".to_string(), "s3cret".to_string());

        assert_eq!(
            config.get_from_env_indirection("password").unwrap(),
            Some("s3cret".to_string())
        );
    }

    #[test]
    fn test_env_indirection_missing_variable_is_an_error() {
        let mut config = test_config();
        config
            .trigger_metadata
            .insert("passwordFromEnv".to_string(), "DB_PW".to_string());

        let err = config.get_from_env_indirection("password").unwrap_err();
        assert!(matches!(
            err,
            ScalerError::MissingRequiredField { ref field } if field == "password"
        ));
    }

    #[test]
    fn test_no_indirection_declared_is_none() {
        let config = test_config();
        assert_eq!(config.get_from_env_indirection("password").unwrap(), None);
    }

    #[test]
    fn test_metric_type_defaults_to_average_value() {
        let config = test_config();
        assert_eq!(config.resolved_metric_type().unwrap(), MetricType::AverageValue);
    }

    #[test]
    fn test_utilization_is_rejected() {
        let mut config = test_config();
        config.metric_type = Some(MetricType::Utilization);
        let err = config.resolved_metric_type().unwrap_err();
        assert_eq!(err.kind(), "bad-value");
    }
}
