//! # Scaler Framework
//!
//! The polymorphic contract every trigger type implements, the metric value
//! types exchanged with the orchestrator, and the construction pipeline
//! around them.
//!
//! A scaler's lifecycle is `constructed → queried* → closed`: the factory
//! builds one scaler per trigger declaration, the adapter queries it on
//! every external-metrics request, and the controller closes it exactly once
//! when the trigger is removed. Calls after close fail; close itself is
//! idempotent.

pub mod binder;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod http;
pub mod sessions;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tokio::sync::watch;

pub use binder::{Param, ParamSource, ParamValue, TriggerMetadataRecord};
pub use config::{MetricType, PodIdentity, PodIdentityProvider, ScalerConfig};
pub use context::ScalerContext;
pub use error::ScalerError;

use crate::constants;

/// Target the HPA steers toward: per-replica average or workload-wide value.
/// Utilization never reaches this type; the factory rejects it.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricTarget {
    /// Per-replica average target
    AverageValue(Quantity),
    /// Workload-wide target
    Value(Quantity),
}

impl MetricTarget {
    /// Build a target from the resolved metric type and a numeric threshold
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::BadValue`] for [`MetricType::Utilization`].
    pub fn new(metric_type: MetricType, value: f64) -> Result<Self, ScalerError> {
        match metric_type {
            MetricType::AverageValue => Ok(Self::AverageValue(quantity_from_f64(value))),
            MetricType::Value => Ok(Self::Value(quantity_from_f64(value))),
            MetricType::Utilization => Err(ScalerError::bad_value(
                "metricType",
                "Utilization targets cannot be expressed as external metrics",
            )),
        }
    }

    /// The target quantity regardless of interpretation
    #[must_use]
    pub const fn quantity(&self) -> &Quantity {
        match self {
            Self::AverageValue(q) | Self::Value(q) => q,
        }
    }
}

/// What a scaler advertises to the orchestrator for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    /// Normalized, index-prefixed identifier (`s<index>-<type>-<qualifier>`)
    pub metric_name: String,
    /// Target the autoscaler steers toward
    pub target: MetricTarget,
}

/// One numeric observation produced for one query
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Identifier this sample answers for
    pub name: String,
    /// Observed value; fractional values render as milli-quantities
    pub value: Quantity,
    /// When the observation was produced
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Sample stamped with the current time
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: quantity_from_f64(value),
            timestamp: Utc::now(),
        }
    }
}

/// Paired result of a metric query: the samples plus the activation bit
#[derive(Debug, Clone)]
pub struct MetricReport {
    /// Samples for the requested metric
    pub samples: Vec<MetricSample>,
    /// True when the workload should be scaled above zero right now
    pub active: bool,
}

impl MetricReport {
    /// Single-sample report with activity derived from the strict
    /// `value > activation_threshold` rule
    #[must_use]
    pub fn single(name: impl Into<String>, value: f64, activation_threshold: f64) -> Self {
        Self {
            samples: vec![MetricSample::new(name, value)],
            active: value > activation_threshold,
        }
    }
}

/// The contract every trigger type implements.
///
/// `get_metric_spec_for_scaling` is pure and must return byte-identical
/// identifiers and targets for the scaler's lifetime. Queries honor the
/// context's cancellation and deadline. Errors surface typed; the only
/// value ever substituted is the documented empty-response fallback.
#[async_trait]
pub trait Scaler: std::fmt::Debug + Send + Sync {
    /// Stable trigger type tag, for logs and error counters
    fn scaler_type(&self) -> &'static str;

    /// Advertise metric identifiers and targets; deterministic across calls
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::AlreadyClosed`] after close.
    async fn get_metric_spec_for_scaling(
        &self,
        ctx: &ScalerContext,
    ) -> Result<Vec<MetricSpec>, ScalerError>;

    /// Read the current value and activation bit for `metric_name`, which
    /// must match an advertised identifier
    ///
    /// # Errors
    ///
    /// Returns a typed [`ScalerError`] on mismatch, transport or auth
    /// failure, cancellation, or after close.
    async fn get_metrics_and_activity(
        &self,
        ctx: &ScalerContext,
        metric_name: &str,
    ) -> Result<MetricReport, ScalerError>;

    /// Release backend resources. Idempotent; safe after construction
    /// failure; must not wait for in-flight queries (cancel them first).
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError`] when resource release fails.
    async fn close(&self, ctx: &ScalerContext) -> Result<(), ScalerError>;

    /// Downcast to the push capability when the scaler streams activity
    fn as_push(self: Arc<Self>) -> Option<Arc<dyn PushScaler>> {
        None
    }
}

/// Capability of scalers that push activity changes instead of waiting to be
/// polled
#[async_trait]
pub trait PushScaler: Scaler {
    /// Stream activity transitions until the context is cancelled.
    ///
    /// The scaler is the sole writer of `active`. The watch channel gives
    /// consumers last-writer-wins semantics and closes exactly once when the
    /// sender drops on return.
    async fn run(&self, ctx: ScalerContext, active: watch::Sender<bool>);
}

/// Boxed scaler handle shared between the controller cache and the adapter
pub type SharedScaler = Arc<dyn Scaler>;

/// Closed-state tracking shared by scaler implementations
#[derive(Debug, Default)]
pub struct ScalerState {
    closed: AtomicBool,
}

impl ScalerState {
    /// Fail the call when the scaler has been closed
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::AlreadyClosed`] after [`ScalerState::mark_closed`].
    pub fn ensure_open(&self) -> Result<(), ScalerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScalerError::AlreadyClosed);
        }
        Ok(())
    }

    /// Transition to closed; returns false when already closed
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// True once closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Render a numeric value as a Kubernetes quantity: whole values as plain
/// integers, fractional values in milli-units (`1.5` → `1500m`)
#[must_use]
pub fn quantity_from_f64(value: f64) -> Quantity {
    let millis = (value * 1000.0).round();
    if millis % 1000.0 == 0.0 {
        Quantity(format!("{}", (millis / 1000.0) as i64))
    } else {
        Quantity(format!("{millis}m", millis = millis as i64))
    }
}

/// Read back a quantity produced by [`quantity_from_f64`]
///
/// # Errors
///
/// Returns [`ScalerError::BadValue`] for quantities outside the plain or
/// milli-unit forms.
pub fn quantity_to_f64(quantity: &Quantity) -> Result<f64, ScalerError> {
    let raw = quantity.0.as_str();
    if let Some(milli) = raw.strip_suffix('m') {
        let parsed: f64 = milli
            .parse()
            .map_err(|_| ScalerError::bad_value("quantity", format!("{raw:?} is not a quantity")))?;
        return Ok(parsed / 1000.0);
    }
    raw.parse()
        .map_err(|_| ScalerError::bad_value("quantity", format!("{raw:?} is not a quantity")))
}

/// Normalize an identifier fragment: lowercase, and every byte outside
/// `[a-z0-9-]` maps to `-`. Two fragments collide after normalization only
/// when they already differed solely in case or separator characters.
#[must_use]
pub fn normalize_identifier_fragment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() || lower == '-' {
                lower
            } else {
                '-'
            }
        })
        .collect()
}

/// Build the identifier a scaler exposes for one metric:
/// `s<index>-<type>-<qualifier>`, normalized to `[a-z0-9-]`
#[must_use]
pub fn metric_identifier(trigger_index: usize, trigger_type: &str, qualifier: &str) -> String {
    normalize_identifier_fragment(&format!(
        "{prefix}{trigger_index}-{trigger_type}-{qualifier}",
        prefix = constants::METRIC_NAME_INDEX_PREFIX,
    ))
}

/// Case-insensitive identifier comparison used when matching a requested
/// metric name against advertised specs
#[must_use]
pub fn identifiers_match(requested: &str, advertised: &str) -> bool {
    requested.eq_ignore_ascii_case(advertised)
}
