//! # External Metrics Adapter
//!
//! Translates external-metrics queries from the orchestrator into scaler
//! invocations. The adapter never constructs scalers: the controller owns
//! construction and caching, and the adapter resolves the queried workload
//! through the controller-owned cache, fans the metric name out across that
//! workload's scalers, and concatenates the matching samples.
//!
//! One failing scaler never poisons its siblings: per-scaler errors are
//! logged, counted, and skipped.

pub mod push_bridge;
pub mod selector;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info_span, Instrument};

use crate::observability::metrics as obs;
use crate::scaler::{identifiers_match, MetricSample, ScalerContext, SharedScaler};
pub use selector::LabelSelector;

/// Errors the external-metrics endpoint maps onto API responses
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No workload declaration matches the selector
    #[error("no scaled object in namespace {namespace:?} matches selector {selector:?}")]
    NotFound {
        /// Queried namespace
        namespace: String,
        /// Raw selector from the query
        selector: String,
    },

    /// More than one workload declaration matches the selector
    #[error("selector {selector:?} matches {count} scaled objects in namespace {namespace:?}")]
    Ambiguous {
        /// Queried namespace
        namespace: String,
        /// Raw selector from the query
        selector: String,
        /// How many declarations matched
        count: usize,
    },

    /// The workload resolved but none of its scalers produced the metric
    #[error("no scaler for scaled object {scaled_object:?} produced metric {metric_name:?}")]
    NoMatchingMetric {
        /// The resolved workload
        scaled_object: String,
        /// The requested metric identifier
        metric_name: String,
    },

    /// The label selector could not be parsed
    #[error("invalid label selector: {reason}")]
    InvalidSelector {
        /// Why parsing failed
        reason: String,
    },
}

impl AdapterError {
    /// Stable kind tag for the request outcome counter
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not-found",
            Self::Ambiguous { .. } => "ambiguous",
            Self::NoMatchingMetric { .. } => "no-matching-metric",
            Self::InvalidSelector { .. } => "bad-input",
        }
    }
}

/// One scaler bound to a trigger declaration, with its position in the
/// workload's trigger list
#[derive(Clone)]
pub struct ScalerHandle {
    /// The constructed scaler
    pub scaler: SharedScaler,
    /// Trigger position, used in instrumentation tags
    pub trigger_index: usize,
}

impl std::fmt::Debug for ScalerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalerHandle")
            .field("scaler_type", &self.scaler.scaler_type())
            .field("trigger_index", &self.trigger_index)
            .finish()
    }
}

/// One workload declaration with the scalers the controller built for it
#[derive(Debug)]
pub struct ScalersEntry {
    /// Scaled object name
    pub name: String,
    /// Scaled object namespace
    pub namespace: String,
    /// Labels the selector is matched against
    pub labels: BTreeMap<String, String>,
    /// The workload's scalers, one per trigger
    pub scalers: Vec<ScalerHandle>,
}

/// The controller-owned cache the adapter resolves workloads through
pub trait ScaledObjectCache: Send + Sync {
    /// All cached declarations in `namespace`
    fn list(&self, namespace: &str) -> Vec<Arc<ScalersEntry>>;
}

/// In-memory cache implementation used by the standalone binary and tests
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<(String, String), Arc<ScalersEntry>>>,
}

impl InMemoryCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workload declaration
    pub fn upsert(&self, entry: ScalersEntry) {
        let key = (entry.namespace.clone(), entry.name.clone());
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(key, Arc::new(entry));
    }

    /// Remove a workload declaration, returning it for teardown
    pub fn remove(&self, namespace: &str, name: &str) -> Option<Arc<ScalersEntry>> {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(&(namespace.to_string(), name.to_string()))
    }

    /// Every cached declaration across all namespaces, for shutdown teardown
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ScalersEntry>> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl ScaledObjectCache for InMemoryCache {
    fn list(&self, namespace: &str) -> Vec<Arc<ScalersEntry>> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .values()
            .filter(|entry| entry.namespace == namespace)
            .cloned()
            .collect()
    }
}

/// The external-metrics adapter
pub struct MetricsAdapter {
    cache: Arc<dyn ScaledObjectCache>,
}

impl std::fmt::Debug for MetricsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsAdapter").finish_non_exhaustive()
    }
}

impl MetricsAdapter {
    /// Adapter over the controller-owned cache
    #[must_use]
    pub fn new(cache: Arc<dyn ScaledObjectCache>) -> Self {
        Self { cache }
    }

    /// Answer one external-metrics query: resolve the unique declaration the
    /// selector addresses, invoke every scaler advertising the metric, and
    /// concatenate the samples.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::NotFound`] / [`AdapterError::Ambiguous`] when
    /// the selector does not resolve exactly one declaration, and
    /// [`AdapterError::NoMatchingMetric`] when no sample was produced.
    pub async fn get_external_metric(
        &self,
        ctx: &ScalerContext,
        namespace: &str,
        metric_name: &str,
        raw_selector: &str,
    ) -> Result<Vec<MetricSample>, AdapterError> {
        let started = Instant::now();
        let selector = LabelSelector::parse(raw_selector)?;

        let matches: Vec<Arc<ScalersEntry>> = self
            .cache
            .list(namespace)
            .into_iter()
            .filter(|entry| selector.matches(&entry.labels))
            .collect();
        let entry = match matches.as_slice() {
            [] => {
                return Err(AdapterError::NotFound {
                    namespace: namespace.to_string(),
                    selector: raw_selector.to_string(),
                })
            }
            [single] => Arc::clone(single),
            many => {
                return Err(AdapterError::Ambiguous {
                    namespace: namespace.to_string(),
                    selector: raw_selector.to_string(),
                    count: many.len(),
                })
            }
        };

        let span = info_span!(
            "external_metric_query",
            namespace,
            scaled_object = %entry.name,
            metric = metric_name,
        );
        let samples = self
            .query_scalers(ctx, &entry, metric_name)
            .instrument(span)
            .await;

        obs::observe_adapter_request_duration(namespace, started.elapsed().as_secs_f64());
        if samples.is_empty() {
            return Err(AdapterError::NoMatchingMetric {
                scaled_object: entry.name.clone(),
                metric_name: metric_name.to_string(),
            });
        }
        Ok(samples)
    }

    /// Invoke every scaler whose advertised specs include `metric_name`.
    /// Failures are logged and counted; the loop continues.
    async fn query_scalers(
        &self,
        ctx: &ScalerContext,
        entry: &ScalersEntry,
        metric_name: &str,
    ) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for handle in &entry.scalers {
            let scaler_type = handle.scaler.scaler_type();
            let specs = match handle.scaler.get_metric_spec_for_scaling(ctx).await {
                Ok(specs) => specs,
                Err(err) => {
                    error!(scaler_type, error = %err, "failed to read metric spec");
                    obs::increment_scaler_errors(
                        scaler_type,
                        &entry.namespace,
                        &entry.name,
                        handle.trigger_index,
                        metric_name,
                        err.kind(),
                    );
                    continue;
                }
            };
            if !specs
                .iter()
                .any(|spec| identifiers_match(metric_name, &spec.metric_name))
            {
                continue;
            }

            let query_started = Instant::now();
            match handle.scaler.get_metrics_and_activity(ctx, metric_name).await {
                Ok(report) => {
                    debug!(
                        scaler_type,
                        active = report.active,
                        samples = report.samples.len(),
                        "scaler produced metric"
                    );
                    for sample in &report.samples {
                        if let Ok(value) = crate::scaler::quantity_to_f64(&sample.value) {
                            obs::record_scaler_metric_value(
                                scaler_type,
                                &entry.namespace,
                                &entry.name,
                                handle.trigger_index,
                                &sample.name,
                                value,
                            );
                        }
                    }
                    samples.extend(report.samples);
                }
                Err(err) => {
                    error!(scaler_type, error = %err, "scaler query failed");
                    obs::increment_scaler_errors(
                        scaler_type,
                        &entry.namespace,
                        &entry.name,
                        handle.trigger_index,
                        metric_name,
                        err.kind(),
                    );
                }
            }
            obs::observe_scaler_latency(
                scaler_type,
                &entry.namespace,
                &entry.name,
                query_started.elapsed().as_secs_f64(),
            );
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::scaler::{
        MetricReport, MetricSpec, MetricTarget, MetricType, Scaler, ScalerError, ScalerState,
    };

    /// Fixed-value scaler for adapter tests
    #[derive(Debug)]
    struct StaticScaler {
        metric_name: String,
        value: f64,
        fail_query: bool,
        state: ScalerState,
    }

    impl StaticScaler {
        fn new(metric_name: &str, value: f64) -> Self {
            Self {
                metric_name: metric_name.to_string(),
                value,
                fail_query: false,
                state: ScalerState::default(),
            }
        }

        fn failing(metric_name: &str) -> Self {
            Self {
                fail_query: true,
                ..Self::new(metric_name, 0.0)
            }
        }
    }

    #[async_trait]
    impl Scaler for StaticScaler {
        fn scaler_type(&self) -> &'static str {
            "static"
        }

        async fn get_metric_spec_for_scaling(
            &self,
            _ctx: &ScalerContext,
        ) -> Result<Vec<MetricSpec>, ScalerError> {
            self.state.ensure_open()?;
            Ok(vec![MetricSpec {
                metric_name: self.metric_name.clone(),
                target: MetricTarget::new(MetricType::AverageValue, 10.0)?,
            }])
        }

        async fn get_metrics_and_activity(
            &self,
            _ctx: &ScalerContext,
            metric_name: &str,
        ) -> Result<MetricReport, ScalerError> {
            self.state.ensure_open()?;
            if self.fail_query {
                return Err(ScalerError::Transport {
                    backend: "static".to_string(),
                    source: "synthetic failure".into(),
                });
            }
            Ok(MetricReport::single(metric_name, self.value, 0.0))
        }

        async fn close(&self, _ctx: &ScalerContext) -> Result<(), ScalerError> {
            self.state.mark_closed();
            Ok(())
        }
    }

    fn entry(name: &str, labels: &[(&str, &str)], scalers: Vec<ScalerHandle>) -> ScalersEntry {
        ScalersEntry {
            name: name.to_string(),
            namespace: "default".to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            scalers,
        }
    }

    fn handle(scaler: StaticScaler, trigger_index: usize) -> ScalerHandle {
        ScalerHandle {
            scaler: Arc::new(scaler),
            trigger_index,
        }
    }

    fn adapter_with(entries: Vec<ScalersEntry>) -> MetricsAdapter {
        let cache = InMemoryCache::new();
        for e in entries {
            cache.upsert(e);
        }
        MetricsAdapter::new(Arc::new(cache))
    }

    #[tokio::test]
    async fn test_zero_matches_is_not_found() {
        let adapter = adapter_with(vec![]);
        let err = adapter
            .get_external_metric(&ScalerContext::background(), "default", "s0-static-x", "app=orders")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn test_multiple_matches_is_ambiguous() {
        let adapter = adapter_with(vec![
            entry("a", &[("app", "orders")], vec![handle(StaticScaler::new("s0-static-x", 1.0), 0)]),
            entry("b", &[("app", "orders")], vec![handle(StaticScaler::new("s0-static-x", 2.0), 0)]),
        ]);
        let err = adapter
            .get_external_metric(&ScalerContext::background(), "default", "s0-static-x", "app=orders")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ambiguous");
    }

    #[tokio::test]
    async fn test_matching_scaler_produces_samples() {
        let adapter = adapter_with(vec![entry(
            "orders-api",
            &[("app", "orders")],
            vec![handle(StaticScaler::new("s0-static-x", 37.0), 0)],
        )]);
        let samples = adapter
            .get_external_metric(&ScalerContext::background(), "default", "s0-static-x", "app=orders")
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value.0, "37");
    }

    #[tokio::test]
    async fn test_metric_name_matching_is_case_insensitive() {
        let adapter = adapter_with(vec![entry(
            "orders-api",
            &[("app", "orders")],
            vec![handle(StaticScaler::new("s0-static-x", 5.0), 0)],
        )]);
        let samples = adapter
            .get_external_metric(&ScalerContext::background(), "default", "S0-Static-X", "app=orders")
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_scaler_does_not_poison_siblings() {
        let adapter = adapter_with(vec![entry(
            "orders-api",
            &[("app", "orders")],
            vec![
                handle(StaticScaler::failing("s0-static-x"), 0),
                handle(StaticScaler::new("s0-static-x", 12.0), 1),
            ],
        )]);
        let samples = adapter
            .get_external_metric(&ScalerContext::background(), "default", "s0-static-x", "app=orders")
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value.0, "12");
    }

    #[tokio::test]
    async fn test_unknown_metric_is_no_matching_metric() {
        let adapter = adapter_with(vec![entry(
            "orders-api",
            &[("app", "orders")],
            vec![handle(StaticScaler::new("s0-static-x", 1.0), 0)],
        )]);
        let err = adapter
            .get_external_metric(&ScalerContext::background(), "default", "s9-other-y", "app=orders")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "no-matching-metric");
    }

    #[tokio::test]
    async fn test_invalid_selector_is_bad_input() {
        let adapter = adapter_with(vec![]);
        let err = adapter
            .get_external_metric(&ScalerContext::background(), "default", "s0-static-x", "garbage")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "bad-input");
    }
}
