//! # HTTP Server
//!
//! Axum server exposing the external-metrics endpoint alongside the
//! operational surface: health and readiness probes and the Prometheus
//! `/metrics` route.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::SecondsFormat;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::adapter::{AdapterError, MetricsAdapter};
use crate::constants;
use crate::observability;
use crate::scaler::ScalerContext;

/// Shared server state
#[derive(Debug)]
pub struct ServerState {
    /// Flipped once the listener is bound; backs the readiness probe
    pub is_ready: AtomicBool,
    /// The external-metrics adapter
    pub adapter: Arc<MetricsAdapter>,
    /// Deadline applied to every external-metrics query
    pub query_timeout: Duration,
}

/// Start the HTTP server and serve until the process exits
///
/// # Errors
///
/// Returns an error when the listener cannot bind.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let external_metrics_path = format!(
        "/apis/{}/{}/namespaces/{{namespace}}/{{metric}}",
        constants::EXTERNAL_METRICS_API_GROUP,
        constants::EXTERNAL_METRICS_API_VERSION,
    );
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(&external_metrics_path, get(external_metric))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind HTTP server to port {port}"))?;
    info!(port, "HTTP server listening");
    state.is_ready.store(true, Ordering::Release);

    axum::serve(listener, app)
        .await
        .context("HTTP server exited")?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ServerState>>) -> Response {
    if state.is_ready.load(Ordering::Acquire) {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics() -> Response {
    match observability::metrics::export_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            error!(%err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding failure").into_response()
        }
    }
}

/// `GET /apis/external.metrics.k8s.io/v1beta1/namespaces/{namespace}/{metric}?labelSelector=…`
async fn external_metric(
    State(state): State<Arc<ServerState>>,
    Path((namespace, metric)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let selector = params.get("labelSelector").map(String::as_str).unwrap_or("");
    let ctx = ScalerContext::with_timeout(state.query_timeout);

    match state
        .adapter
        .get_external_metric(&ctx, &namespace, &metric, selector)
        .await
    {
        Ok(samples) => {
            observability::metrics::increment_adapter_requests(&namespace, &metric, "success");
            let items: Vec<_> = samples
                .iter()
                .map(|sample| {
                    json!({
                        "metricName": sample.name,
                        "metricLabels": {},
                        "timestamp": sample.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                        "value": sample.value.0,
                    })
                })
                .collect();
            Json(json!({
                "kind": "ExternalMetricValueList",
                "apiVersion": format!(
                    "{}/{}",
                    constants::EXTERNAL_METRICS_API_GROUP,
                    constants::EXTERNAL_METRICS_API_VERSION,
                ),
                "metadata": {},
                "items": items,
            }))
            .into_response()
        }
        Err(err) => {
            observability::metrics::increment_adapter_requests(&namespace, &metric, err.kind());
            error!(%namespace, %metric, error = %err, "external metrics query failed");
            failure_response(&err)
        }
    }
}

/// Map adapter errors onto API status responses
fn failure_response(err: &AdapterError) -> Response {
    let code = match err {
        AdapterError::NotFound { .. } | AdapterError::NoMatchingMetric { .. } => {
            StatusCode::NOT_FOUND
        }
        AdapterError::Ambiguous { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AdapterError::InvalidSelector { .. } => StatusCode::BAD_REQUEST,
    };
    let body = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": err.to_string(),
        "reason": err.kind(),
        "code": code.as_u16(),
    });
    (code, Json(body)).into_response()
}
