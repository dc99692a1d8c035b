//! # AWS CloudWatch Scaler
//!
//! Reads one statistic from CloudWatch `GetMetricData` over a trailing
//! collection window. Credentials come from the workload's AWS pod identity
//! or from static keys in auth params; the underlying SDK session is shared
//! through the refcounted session cache so scalers reusing the same identity
//! reuse one session.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_cloudwatch::types::{Dimension, Metric, MetricDataQuery, MetricStat, ScanBy};
use chrono::Utc;
use tracing::{debug, Instrument, Span};

use async_trait::async_trait;

use crate::scaler::binder::TriggerMetadataRecord;
use crate::scaler::config::{MetricType, PodIdentityProvider, ScalerConfig};
use crate::scaler::error::ScalerError;
use crate::scaler::factory::{AwsSessionCache, ScalerBuildContext};
use crate::scaler::{
    identifiers_match, metric_identifier, MetricReport, MetricSpec, MetricTarget, Scaler,
    ScalerContext, ScalerState,
};

/// Type tag this scaler registers under
pub const TRIGGER_TYPE: &str = "aws-cloudwatch";

/// Statistics CloudWatch can aggregate for us
const STATISTICS: &[&str] = &["Average", "Sum", "Minimum", "Maximum", "SampleCount"];

/// How the scaler authenticates against AWS
#[derive(Clone)]
enum AwsAuth {
    /// Pod identity: the SDK default provider chain resolves the role
    PodIdentity,
    /// Static keys from auth params
    Static {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
}

impl std::fmt::Debug for AwsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials stay out of logs.
        match self {
            Self::PodIdentity => f.write_str("PodIdentity"),
            Self::Static { .. } => f.write_str("Static"),
        }
    }
}

/// Typed metadata for one cloudwatch trigger
#[derive(Debug, Clone)]
pub struct CloudWatchMetadata {
    namespace: String,
    metric_name: String,
    dimension_names: Vec<String>,
    dimension_values: Vec<String>,
    statistic: &'static str,
    collection_time_secs: u64,
    stat_period_secs: u64,
    activation_target: f64,
    min_metric_value: f64,
    region: String,
    endpoint: Option<String>,
    auth: AwsAuth,
}

impl TriggerMetadataRecord for CloudWatchMetadata {
    fn bind(config: &ScalerConfig) -> Result<Self, ScalerError> {
        let split_list = |raw: String| -> Vec<String> {
            raw.split(';')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string)
                .collect()
        };
        let dimension_names = config
            .param("dimensionName")
            .get_opt::<String>()?
            .map(split_list)
            .unwrap_or_default();
        let dimension_values = config
            .param("dimensionValue")
            .get_opt::<String>()?
            .map(split_list)
            .unwrap_or_default();

        let auth = if config.pod_identity.provider == PodIdentityProvider::Aws {
            AwsAuth::PodIdentity
        } else {
            AwsAuth::Static {
                access_key_id: config.param("awsAccessKeyID").credential().get()?,
                secret_access_key: config.param("awsSecretAccessKey").credential().get()?,
                session_token: config.param("awsSessionToken").credential().get_opt()?,
            }
        };

        Ok(Self {
            namespace: config.param("namespace").get()?,
            metric_name: config.param("metricName").get()?,
            dimension_names,
            dimension_values,
            statistic: config.param("statistic").default("Average").one_of(STATISTICS)?,
            collection_time_secs: config
                .param("metricCollectionTime")
                .default("300")
                .get_duration(true)?
                .as_secs(),
            stat_period_secs: config
                .param("metricStatPeriod")
                .default("60")
                .get_duration(true)?
                .as_secs(),
            activation_target: config
                .param("activationTargetMetricValue")
                .default("0")
                .get()?,
            min_metric_value: config.param("minMetricValue").default("0").get()?,
            region: config.param("awsRegion").get()?,
            endpoint: config.param("awsEndpoint").get_opt()?,
            auth,
        })
    }

    fn validate(&self) -> Result<(), ScalerError> {
        if self.dimension_names.len() != self.dimension_values.len() {
            return Err(ScalerError::conflicting(
                "dimensionName and dimensionValue must list the same number of entries",
            ));
        }
        if self.stat_period_secs == 0 {
            return Err(ScalerError::bad_value("metricStatPeriod", "must be positive"));
        }
        if self.collection_time_secs == 0
            || self.collection_time_secs % self.stat_period_secs != 0
        {
            return Err(ScalerError::bad_value(
                "metricCollectionTime",
                "must be a positive multiple of metricStatPeriod",
            ));
        }
        Ok(())
    }
}

/// Scaler reading a CloudWatch metric statistic
pub struct CloudWatchScaler {
    metadata: CloudWatchMetadata,
    target: f64,
    client: aws_sdk_cloudwatch::Client,
    sessions: Arc<AwsSessionCache>,
    session_key: String,
    metric_type: MetricType,
    exposed_metric_name: String,
    state: ScalerState,
    span: Span,
}

impl std::fmt::Debug for CloudWatchScaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudWatchScaler")
            .field("metadata", &self.metadata)
            .field("exposed_metric_name", &self.exposed_metric_name)
            .finish_non_exhaustive()
    }
}

impl CloudWatchScaler {
    /// Construct from the factory's build context, acquiring (or sharing)
    /// the SDK session keyed by the trigger-unique key
    ///
    /// # Errors
    ///
    /// Returns binding or validation errors from [`CloudWatchMetadata`].
    pub async fn new(build: ScalerBuildContext) -> Result<Self, ScalerError> {
        let metadata = CloudWatchMetadata::bind_validated(&build.config)?;
        let target = build.bind_target_value("targetMetricValue")?;

        let session_key = build.config.trigger_unique_key.clone();
        let region = metadata.region.clone();
        let auth = metadata.auth.clone();
        let sdk_config = build
            .aws_sessions
            .acquire(&session_key, || async move {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region));
                if let AwsAuth::Static {
                    access_key_id,
                    secret_access_key,
                    session_token,
                } = auth
                {
                    loader = loader.credentials_provider(Credentials::new(
                        access_key_id,
                        secret_access_key,
                        session_token,
                        None,
                        "trigger-auth-params",
                    ));
                }
                Ok(loader.load().await)
            })
            .await?;

        let mut client_config = aws_sdk_cloudwatch::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &metadata.endpoint {
            client_config = client_config.endpoint_url(endpoint);
        }
        let client = aws_sdk_cloudwatch::Client::from_conf(client_config.build());

        let qualifier = format!("{}-{}", metadata.namespace, metadata.metric_name);
        let exposed_metric_name =
            metric_identifier(build.config.trigger_index, TRIGGER_TYPE, &qualifier);

        Ok(Self {
            metadata,
            target,
            client,
            sessions: Arc::clone(&build.aws_sessions),
            session_key,
            metric_type: build.metric_type,
            exposed_metric_name,
            state: ScalerState::default(),
            span: build.span,
        })
    }

    /// Run `GetMetricData` over the trailing window; `Ok(None)` when
    /// CloudWatch returns no datapoints
    async fn query_value(&self) -> Result<Option<f64>, ScalerError> {
        let backend = format!("cloudwatch:{}", self.metadata.namespace);
        let end = Utc::now();
        let start = end - chrono::Duration::seconds(self.metadata.collection_time_secs as i64);

        let dimensions: Vec<Dimension> = self
            .metadata
            .dimension_names
            .iter()
            .zip(&self.metadata.dimension_values)
            .map(|(name, value)| Dimension::builder().name(name).value(value).build())
            .collect();
        let metric = Metric::builder()
            .namespace(&self.metadata.namespace)
            .metric_name(&self.metadata.metric_name)
            .set_dimensions((!dimensions.is_empty()).then_some(dimensions))
            .build();
        let stat = MetricStat::builder()
            .metric(metric)
            .period(self.metadata.stat_period_secs as i32)
            .stat(self.metadata.statistic)
            .build();
        let query = MetricDataQuery::builder()
            .id("q0")
            .metric_stat(stat)
            .return_data(true)
            .build();

        let output = self
            .client
            .get_metric_data()
            .start_time(aws_sdk_cloudwatch::primitives::DateTime::from_millis(
                start.timestamp_millis(),
            ))
            .end_time(aws_sdk_cloudwatch::primitives::DateTime::from_millis(
                end.timestamp_millis(),
            ))
            .metric_data_queries(query)
            .scan_by(ScanBy::TimestampDescending)
            .send()
            .await
            .map_err(|e| ScalerError::transport(&backend, e))?;

        let value = output
            .metric_data_results()
            .first()
            .and_then(|result| result.values().first())
            .copied();
        Ok(value)
    }
}

#[async_trait]
impl Scaler for CloudWatchScaler {
    fn scaler_type(&self) -> &'static str {
        TRIGGER_TYPE
    }

    async fn get_metric_spec_for_scaling(
        &self,
        _ctx: &ScalerContext,
    ) -> Result<Vec<MetricSpec>, ScalerError> {
        self.state.ensure_open()?;
        Ok(vec![MetricSpec {
            metric_name: self.exposed_metric_name.clone(),
            target: MetricTarget::new(self.metric_type, self.target)?,
        }])
    }

    async fn get_metrics_and_activity(
        &self,
        ctx: &ScalerContext,
        metric_name: &str,
    ) -> Result<MetricReport, ScalerError> {
        self.state.ensure_open()?;
        if !identifiers_match(metric_name, &self.exposed_metric_name) {
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
            debug!(
                metric = %self.metadata.metric_name,
                fallback = self.metadata.min_metric_value,
                "no datapoints in collection window, using fallback"
            );
            return Ok(MetricReport {
                samples: vec![crate::scaler::MetricSample::new(
                    &self.exposed_metric_name,
                    self.metadata.min_metric_value,
                )],
                active: false,
            });
        };

        Ok(MetricReport::single(
            &self.exposed_metric_name,
            value,
            self.metadata.activation_target,
        ))
    }

    async fn close(&self, _ctx: &ScalerContext) -> Result<(), ScalerError> {
        if self.state.mark_closed() {
            self.sessions.release(&self.session_key).await;
        }
        Ok(())
    }
}
