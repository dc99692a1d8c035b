//! # Metrics API Scaler
//!
//! Probes an arbitrary HTTP endpoint that returns JSON and reads one number
//! out of the document at `valueLocation` (a dot path, with numeric
//! segments indexing arrays). Built for services that expose a bespoke
//! metrics endpoint instead of a Prometheus surface.

use serde_json::Value;
use tracing::{Instrument, Span};

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
pub const TRIGGER_TYPE: &str = "metrics-api";

/// Authentication for the probed endpoint
#[derive(Clone)]
enum ApiAuth {
    None,
    ApiKey { header: String, key: String },
    Basic { username: String, password: String },
    Bearer(String),
}

impl std::fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials stay out of logs.
        match self {
            Self::None => f.write_str("None"),
            Self::ApiKey { header, .. } => {
                f.debug_struct("ApiKey").field("header", header).finish_non_exhaustive()
            }
            Self::Basic { username, .. } => {
                f.debug_struct("Basic").field("username", username).finish_non_exhaustive()
            }
            Self::Bearer(_) => f.write_str("Bearer"),
        }
    }
}

/// Typed metadata for one metrics-api trigger
#[derive(Debug, Clone)]
pub struct MetricsApiMetadata {
    url: String,
    value_location: String,
    activation_target: f64,
    auth: ApiAuth,
}

impl TriggerMetadataRecord for MetricsApiMetadata {
    fn bind(config: &ScalerConfig) -> Result<Self, ScalerError> {
        let url: String = config.param("url").get()?;
        reqwest::Url::parse(&url)
            .map_err(|e| ScalerError::bad_value("url", format!("{url:?} is not a URL: {e}")))?;

        let auth = match config
            .param("authMode")
            .get_opt::<String>()?
            .map(|mode| mode.to_ascii_lowercase())
            .as_deref()
        {
            None => ApiAuth::None,
            Some("apikey") => ApiAuth::ApiKey {
                header: config
                    .param("keyParamName")
                    .default("X-API-KEY")
                    .get()?,
                key: config.param("apiKey").credential().get()?,
            },
            Some("basic") => ApiAuth::Basic {
                username: config.param("username").credential().get()?,
                password: config.param("password").credential().default("").get()?,
            },
            Some("bearer") => ApiAuth::Bearer(config.param("bearerToken").credential().get()?),
            Some(other) => {
                return Err(ScalerError::bad_value(
                    "authMode",
                    format!("must be one of [apiKey, basic, bearer], got {other:?}"),
                ))
            }
        };

        Ok(Self {
            url,
            value_location: config.param("valueLocation").get()?,
            activation_target: config
                .param("activationTargetValue")
                .default("0")
                .get()?,
            auth,
        })
    }
}

/// Walk a dot path through a JSON document. `Ok(None)` for an explicit null
/// at the leaf; missing segments and non-numeric leaves are bad-value.
fn value_at_location(document: &Value, location: &str) -> Result<Option<f64>, ScalerError> {
    let mut current = document;
    for segment in location.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment).ok_or_else(|| {
                ScalerError::bad_value(
                    "valueLocation",
                    format!("key {segment:?} not present in response"),
                )
            })?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| {
                    ScalerError::bad_value(
                        "valueLocation",
                        format!("segment {segment:?} does not index an array"),
                    )
                })?;
                items.get(index).ok_or_else(|| {
                    ScalerError::bad_value(
                        "valueLocation",
                        format!("index {index} out of bounds in response"),
                    )
                })?
            }
            _ => {
                return Err(ScalerError::bad_value(
                    "valueLocation",
                    format!("segment {segment:?} descends into a scalar"),
                ))
            }
        };
    }

    match current {
        Value::Null => Ok(None),
        Value::Number(number) => number.as_f64().map(Some).ok_or_else(|| {
            ScalerError::bad_value("valueLocation", "value does not fit a 64-bit float")
        }),
        Value::String(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ScalerError::bad_value("valueLocation", format!("{raw:?} is not numeric"))),
        other => Err(ScalerError::bad_value(
            "valueLocation",
            format!("expected a number, found {other}"),
        )),
    }
}

/// Scaler probing a JSON metrics endpoint
#[derive(Debug)]
pub struct MetricsApiScaler {
    metadata: MetricsApiMetadata,
    target: f64,
    http: reqwest::Client,
    metric_type: MetricType,
    metric_name: String,
    state: ScalerState,
    span: Span,
}

impl MetricsApiScaler {
    /// Construct from the factory's build context
    ///
    /// # Errors
    ///
    /// Returns binding or validation errors from [`MetricsApiMetadata`].
    pub fn new(build: ScalerBuildContext) -> Result<Self, ScalerError> {
        let metadata = MetricsApiMetadata::bind_validated(&build.config)?;
        let target = build.bind_target_value("targetValue")?;
        let metric_name = metric_identifier(
            build.config.trigger_index,
            TRIGGER_TYPE,
            &metadata.value_location,
        );
        Ok(Self {
            metadata,
            target,
            http: build.http_client,
            metric_type: build.metric_type,
            metric_name,
            state: ScalerState::default(),
            span: build.span,
        })
    }

    async fn query_value(&self) -> Result<Option<f64>, ScalerError> {
        let backend = self.metadata.url.as_str();
        let mut request = self.http.get(backend);
        request = match &self.metadata.auth {
            ApiAuth::None => request,
            ApiAuth::ApiKey { header, key } => request.header(header.as_str(), key.as_str()),
            ApiAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
            ApiAuth::Bearer(token) => request.bearer_auth(token),
        };

        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(backend, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(backend, status));
        }
        let document: Value = response
            .json()
            .await
            .map_err(|e| ScalerError::transport(backend, e))?;
        value_at_location(&document, &self.metadata.value_location)
    }
}

#[async_trait]
impl Scaler for MetricsApiScaler {
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
            target: MetricTarget::new(self.metric_type, self.target)?,
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
        let Some(value) = value else {
            return Ok(MetricReport {
                samples: vec![crate::scaler::MetricSample::new(&self.metric_name, 0.0)],
                active: false,
            });
        };

        Ok(MetricReport::single(
            &self.metric_name,
            value,
            self.metadata.activation_target,
        ))
    }

    async fn close(&self, _ctx: &ScalerContext) -> Result<(), ScalerError> {
        self.state.mark_closed();
        Ok(())
    }
}
