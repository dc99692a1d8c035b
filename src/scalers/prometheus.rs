//! # Prometheus Scaler
//!
//! Drives scaling off a Prometheus instant query. The query must resolve to
//! at most one series; its sample value is compared against `threshold`.
//! An empty result vector is the empty-response case: with
//! `ignoreNullValues` (the default) the scaler reports the fallback value 0
//! and inactive, otherwise the query fails.

use serde::Deserialize;
use tracing::{debug, Instrument, Span};

use async_trait::async_trait;

use crate::scaler::binder::TriggerMetadataRecord;
use crate::scaler::config::{MetricType, ScalerConfig};
use crate::scaler::error::ScalerError;
use crate::scaler::factory::ScalerBuildContext;
use crate::scaler::http::{map_request_error, map_status_error};
use crate::scaler::{
    identifiers_match, metric_identifier, MetricReport, MetricSpec, MetricTarget, Scaler,
    ScalerContext, ScalerState,
};

/// Type tag this scaler registers under
pub const TRIGGER_TYPE: &str = "prometheus";

/// How the scaler authenticates against the Prometheus endpoint
#[derive(Clone)]
enum PrometheusAuth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for PrometheusAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials stay out of logs.
        match self {
            Self::None => f.write_str("None"),
            Self::Bearer(_) => f.write_str("Bearer"),
            Self::Basic { username, .. } => {
                f.debug_struct("Basic").field("username", username).finish_non_exhaustive()
            }
        }
    }
}

/// Typed metadata for one prometheus trigger
#[derive(Debug, Clone)]
pub struct PrometheusMetadata {
    server_address: String,
    query: String,
    activation_threshold: f64,
    ignore_null_values: bool,
    auth: PrometheusAuth,
}

impl TriggerMetadataRecord for PrometheusMetadata {
    fn bind(config: &ScalerConfig) -> Result<Self, ScalerError> {
        let server_address: String = config.param("serverAddress").get()?;
        reqwest::Url::parse(&server_address).map_err(|e| {
            ScalerError::bad_value("serverAddress", format!("{server_address:?} is not a URL: {e}"))
        })?;

        let bearer = config
            .auth_params
            .get("bearerToken")
            .filter(|v| !v.is_empty())
            .cloned();
        let username = config
            .auth_params
            .get("username")
            .filter(|v| !v.is_empty())
            .cloned();
        let auth = match (bearer, username) {
            (Some(_), Some(_)) => {
                return Err(ScalerError::conflicting(
                    "bearerToken and username/password are mutually exclusive",
                ))
            }
            (Some(token), None) => PrometheusAuth::Bearer(token),
            (None, Some(username)) => PrometheusAuth::Basic {
                username,
                password: config.param("password").credential().default("").get()?,
            },
            (None, None) => PrometheusAuth::None,
        };

        Ok(Self {
            server_address,
            query: config.param("query").get()?,
            activation_threshold: config.param("activationThreshold").default("0").get()?,
            ignore_null_values: config.param("ignoreNullValues").default("true").get()?,
            auth,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    /// Instant-vector sample: `[unix_time, "value"]`
    value: (f64, String),
}

/// Scaler backed by a Prometheus instant query
#[derive(Debug)]
pub struct PrometheusScaler {
    metadata: PrometheusMetadata,
    threshold: f64,
    http: reqwest::Client,
    metric_type: MetricType,
    metric_name: String,
    state: ScalerState,
    span: Span,
}

impl PrometheusScaler {
    /// Construct from the factory's build context
    ///
    /// # Errors
    ///
    /// Returns binding or validation errors from [`PrometheusMetadata`].
    pub fn new(build: ScalerBuildContext) -> Result<Self, ScalerError> {
        let metadata = PrometheusMetadata::bind_validated(&build.config)?;
        let threshold = build.bind_target_value("threshold")?;

        // Qualifier: the server authority, which names the backend being read.
        let url = reqwest::Url::parse(&metadata.server_address)
            .map_err(|e| ScalerError::bad_value("serverAddress", e.to_string()))?;
        let qualifier = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}-{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => "prometheus".to_string(),
        };
        let metric_name = metric_identifier(build.config.trigger_index, TRIGGER_TYPE, &qualifier);

        Ok(Self {
            metadata,
            threshold,
            http: build.http_client,
            metric_type: build.metric_type,
            metric_name,
            state: ScalerState::default(),
            span: build.span,
        })
    }

    /// Execute the instant query; `Ok(None)` means an empty result vector
    async fn query_value(&self) -> Result<Option<f64>, ScalerError> {
        let backend = self.metadata.server_address.as_str();
        let url = format!(
            "{}/api/v1/query",
            self.metadata.server_address.trim_end_matches('/')
        );
        let mut request = self
            .http
            .get(&url)
            .query(&[("query", self.metadata.query.as_str())]);
        request = match &self.metadata.auth {
            PrometheusAuth::None => request,
            PrometheusAuth::Bearer(token) => request.bearer_auth(token),
            PrometheusAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(backend, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(backend, status));
        }
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| ScalerError::transport(backend, e))?;

        match body.data.result.as_slice() {
            [] => Ok(None),
            [single] => {
                let raw = single.value.1.as_str();
                let value: f64 = raw.parse().map_err(|_| {
                    ScalerError::bad_value("query", format!("sample {raw:?} is not numeric"))
                })?;
                if value.is_finite() {
                    Ok(Some(value))
                } else {
                    // NaN marks a null sample in instant vectors.
                    Ok(None)
                }
            }
            many => Err(ScalerError::bad_value(
                "query",
                format!("returned {} series, expected at most one", many.len()),
            )),
        }
    }
}

#[async_trait]
impl Scaler for PrometheusScaler {
    fn scaler_type(&self) -> &'static str {
        TRIGGER_TYPE
    }

    async fn get_metric_spec_for_scaling(
        &self,
        _ctx: &ScalerContext,
    ) -> Result<Vec<MetricSpec>, ScalerError> {
        self.state.ensure_open()?;
        Ok(vec![MetricSpec {
            metric_name: self.metric_name.clone(),
            target: MetricTarget::new(self.metric_type, self.threshold)?,
        }])
    }

    async fn get_metrics_and_activity(
        &self,
        ctx: &ScalerContext,
        metric_name: &str,
    ) -> Result<MetricReport, ScalerError> {
        self.state.ensure_open()?;
        if !identifiers_match(metric_name, &self.metric_name) {
            return Err(ScalerError::bad_value(
                "metricName",
                format!("{metric_name:?} is not advertised by this scaler"),
            ));
        }

        let value = ctx
            .run(self.query_value())
            .instrument(self.span.clone())
            .await?;
        let value = match value {
            Some(value) => value,
            None if self.metadata.ignore_null_values => {
                debug!("query returned no data, reporting fallback value");
                return Ok(MetricReport {
                    samples: vec![crate::scaler::MetricSample::new(&self.metric_name, 0.0)],
                    active: false,
                });
            }
            None => {
                return Err(ScalerError::EmptyResponse {
                    backend: self.metadata.server_address.clone(),
                })
            }
        };

        Ok(MetricReport::single(
            &self.metric_name,
            value,
            self.metadata.activation_threshold,
        ))
    }

    async fn close(&self, _ctx: &ScalerContext) -> Result<(), ScalerError> {
        self.state.mark_closed();
        Ok(())
    }
}
