//! # Cron Scaler
//!
//! Scales a workload inside a recurring time window. The window is described
//! by two cron expressions (`start`, `end`) evaluated in a named timezone;
//! inside the window the metric reports `desiredReplicas` and the workload
//! is active, outside it reports 0 and inactive.
//!
//! This is the push-capable scaler: `run` streams activity transitions at
//! every window boundary so the controller does not have to poll for them.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::watch;
use tracing::{debug, Instrument, Span};

use crate::scaler::binder::TriggerMetadataRecord;
use crate::scaler::config::{MetricType, ScalerConfig};
use crate::scaler::error::ScalerError;
use crate::scaler::factory::ScalerBuildContext;
use crate::scaler::{
    identifiers_match, metric_identifier, MetricReport, MetricSpec, MetricTarget, PushScaler,
    Scaler, ScalerContext, ScalerState,
};

/// Type tag this scaler registers under
pub const TRIGGER_TYPE: &str = "cron";

/// Slack added when sleeping to a window boundary so the wake-up lands on
/// the far side of it
const BOUNDARY_SLACK: Duration = Duration::from_millis(500);

/// Typed metadata for one cron trigger
#[derive(Debug, Clone)]
pub struct CronMetadata {
    timezone: Tz,
    start_expr: String,
    end_expr: String,
    start: Schedule,
    end: Schedule,
    desired_replicas: i64,
}

impl TriggerMetadataRecord for CronMetadata {
    fn bind(config: &ScalerConfig) -> Result<Self, ScalerError> {
        let tz_name: String = config.param("timezone").get()?;
        let timezone: Tz = tz_name
            .parse()
            .map_err(|_| ScalerError::bad_value("timezone", format!("unknown timezone {tz_name:?}")))?;

        let start_expr: String = config.param("start").get()?;
        let end_expr: String = config.param("end").get()?;
        let start = parse_cron("start", &start_expr)?;
        let end = parse_cron("end", &end_expr)?;

        let desired_replicas: i64 = config.param("desiredReplicas").get()?;

        Ok(Self {
            timezone,
            start_expr,
            end_expr,
            start,
            end,
            desired_replicas,
        })
    }

    fn validate(&self) -> Result<(), ScalerError> {
        if self.desired_replicas <= 0 {
            return Err(ScalerError::bad_value(
                "desiredReplicas",
                "must be a positive integer",
            ));
        }
        if self.start_expr == self.end_expr {
            return Err(ScalerError::conflicting(
                "start and end describe the same schedule",
            ));
        }
        Ok(())
    }
}

/// Parse a cron expression, accepting the common 5-field form by prepending
/// a seconds column
fn parse_cron(field: &'static str, expr: &str) -> Result<Schedule, ScalerError> {
    let trimmed = expr.trim();
    let full = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&full)
        .map_err(|e| ScalerError::bad_value(field, format!("invalid cron expression {expr:?}: {e}")))
}

/// Scaler producing a fixed replica target inside a cron-described window
#[derive(Debug)]
pub struct CronScaler {
    metadata: CronMetadata,
    metric_type: MetricType,
    metric_name: String,
    state: ScalerState,
    span: Span,
}

impl CronScaler {
    /// Construct from the factory's build context
    ///
    /// # Errors
    ///
    /// Returns binding or validation errors from [`CronMetadata`].
    pub fn new(build: ScalerBuildContext) -> Result<Self, ScalerError> {
        let metadata = CronMetadata::bind_validated(&build.config)?;
        let qualifier = format!(
            "{}-{}-{}",
            metadata.timezone, metadata.start_expr, metadata.end_expr
        );
        let metric_name = metric_identifier(build.config.trigger_index, TRIGGER_TYPE, &qualifier);
        Ok(Self {
            metadata,
            metric_type: build.metric_type,
            metric_name,
            state: ScalerState::default(),
            span: build.span,
        })
    }

    /// Whether `now` falls inside the window, and the next boundary after it.
    /// Inside the window the next end fires before the next start.
    fn window_state(&self, now: DateTime<Tz>) -> (bool, Option<DateTime<Tz>>) {
        let next_start = self.metadata.start.after(&now).next();
        let next_end = self.metadata.end.after(&now).next();
        match (next_start, next_end) {
            (Some(start), Some(end)) if end < start => (true, Some(end)),
            (Some(start), _) => (false, Some(start)),
            (None, Some(end)) => (true, Some(end)),
            (None, None) => (false, None),
        }
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.metadata.timezone)
    }
}

#[async_trait]
impl Scaler for CronScaler {
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
            target: MetricTarget::new(self.metric_type, self.metadata.desired_replicas as f64)?,
        }])
    }

    async fn get_metrics_and_activity(
        &self,
        ctx: &ScalerContext,
        metric_name: &str,
    ) -> Result<MetricReport, ScalerError> {
        self.state.ensure_open()?;
        if ctx.is_cancelled() {
            return Err(ScalerError::Cancelled);
        }
        if !identifiers_match(metric_name, &self.metric_name) {
            return Err(ScalerError::bad_value(
                "metricName",
                format!("{metric_name:?} is not advertised by this scaler"),
            ));
        }

        let (in_window, _next) = self.window_state(self.now());
        let value = if in_window {
            self.metadata.desired_replicas as f64
        } else {
            0.0
        };
        Ok(MetricReport {
            samples: vec![crate::scaler::MetricSample::new(&self.metric_name, value)],
            active: in_window,
        })
    }

    async fn close(&self, _ctx: &ScalerContext) -> Result<(), ScalerError> {
        self.state.mark_closed();
        Ok(())
    }

    fn as_push(self: Arc<Self>) -> Option<Arc<dyn PushScaler>> {
        Some(self)
    }
}

#[async_trait]
impl PushScaler for CronScaler {
    async fn run(&self, ctx: ScalerContext, active: watch::Sender<bool>) {
        let span = self.span.clone();
        async move {
            loop {
                let now = self.now();
                let (in_window, next) = self.window_state(now);
                if active.send(in_window).is_err() {
                    debug!("activity receiver dropped, stopping cron stream");
                    return;
                }

                let Some(boundary) = next else {
                    // Schedule exhausted; nothing further to report.
                    ctx.token().cancelled().await;
                    return;
                };
                let wait = (boundary - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .saturating_add(BOUNDARY_SLACK);
                debug!(?wait, in_window, "sleeping to next cron boundary");

                tokio::select! {
                    () = ctx.token().cancelled() => return,
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }
        .instrument(span)
        .await;
    }
}
