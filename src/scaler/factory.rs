//! # Scaler Factory
//!
//! Maps trigger type tags to constructors and applies the common
//! pre-construction pipeline: metric-type resolution (Utilization rejected
//! before any constructor runs), per-scaler HTTP client, a tracing span
//! tagged with trigger type and workload, and the shared cloud session
//! cache. The type registry is the `match` in [`ScalerFactory::build`];
//! registration happens at compile time.

use std::sync::Arc;

use tracing::{info, info_span, Span};

use crate::scaler::config::{MetricType, ScalerConfig};
use crate::scaler::error::ScalerError;
use crate::scaler::http;
use crate::scaler::sessions::SessionCache;
use crate::scaler::SharedScaler;
use crate::scalers;

/// Trigger type tags with a registered constructor
pub const SUPPORTED_TRIGGERS: &[&str] = &[
    scalers::cron::TRIGGER_TYPE,
    scalers::prometheus::TRIGGER_TYPE,
    scalers::queue::TRIGGER_TYPE,
    scalers::metrics_api::TRIGGER_TYPE,
    scalers::cloudwatch::TRIGGER_TYPE,
];

/// Shared AWS SDK sessions keyed by trigger-unique key
pub type AwsSessionCache = SessionCache<aws_config::SdkConfig>;

/// Everything a type-specific constructor receives from the pipeline
#[derive(Debug)]
pub struct ScalerBuildContext {
    /// The immutable trigger configuration
    pub config: ScalerConfig,
    /// Resolved metric target type (never Utilization)
    pub metric_type: MetricType,
    /// HTTP client bounded by the global timeout and trigger TLS settings
    pub http_client: reqwest::Client,
    /// Span tagged with trigger type, workload namespace and name; scalers
    /// instrument their backend calls with it
    pub span: Span,
    /// Shared AWS session cache for cloud scalers
    pub aws_sessions: Arc<AwsSessionCache>,
}

impl ScalerBuildContext {
    /// Bind the scaler's target threshold field. Composite-input scalers
    /// (`as_metric_source`) default to 0 instead of requiring a value.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::MissingRequiredField`] or
    /// [`ScalerError::BadValue`].
    pub fn bind_target_value(&self, name: &'static str) -> Result<f64, ScalerError> {
        if self.config.as_metric_source {
            self.config.param(name).default("0").get()
        } else {
            self.config.param(name).get()
        }
    }
}

/// Builds one scaler per trigger configuration
#[derive(Debug, Default)]
pub struct ScalerFactory {
    aws_sessions: Arc<AwsSessionCache>,
}

impl ScalerFactory {
    /// Factory with an empty session cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct the scaler for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::NotFound`] for unknown trigger types,
    /// [`ScalerError::BadValue`] when the metric type is Utilization, and
    /// whatever the type-specific constructor rejects.
    pub async fn build(&self, config: ScalerConfig) -> Result<SharedScaler, ScalerError> {
        let metric_type = config.resolved_metric_type()?;
        let http_client = http::build_http_client(&config)?;
        let span = info_span!(
            "scaler",
            trigger_type = %config.trigger_type,
            namespace = %config.scalable_object_namespace,
            name = %config.scalable_object_name,
            trigger_index = config.trigger_index,
        );

        let trigger_type = config.trigger_type.clone();
        let build = ScalerBuildContext {
            config,
            metric_type,
            http_client,
            span,
            aws_sessions: Arc::clone(&self.aws_sessions),
        };

        let scaler: SharedScaler = match trigger_type.as_str() {
            scalers::cron::TRIGGER_TYPE => Arc::new(scalers::cron::CronScaler::new(build)?),
            scalers::prometheus::TRIGGER_TYPE => {
                Arc::new(scalers::prometheus::PrometheusScaler::new(build)?)
            }
            scalers::queue::TRIGGER_TYPE => Arc::new(scalers::queue::QueueScaler::new(build)?),
            scalers::metrics_api::TRIGGER_TYPE => {
                Arc::new(scalers::metrics_api::MetricsApiScaler::new(build)?)
            }
            scalers::cloudwatch::TRIGGER_TYPE => {
                Arc::new(scalers::cloudwatch::CloudWatchScaler::new(build).await?)
            }
            unknown => {
                return Err(ScalerError::NotFound {
                    what: format!("trigger type {unknown:?}"),
                })
            }
        };

        info!(
            trigger_type = %trigger_type,
            "constructed scaler"
        );
        Ok(scaler)
    }

    /// The shared AWS session cache, for tests and teardown accounting
    #[must_use]
    pub fn aws_sessions(&self) -> &Arc<AwsSessionCache> {
        &self.aws_sessions
    }
}
