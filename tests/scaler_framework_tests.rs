//! Integration tests for the scaler framework: queue-depth scaling against a
//! mocked broker management API, prometheus queries, cancellation behavior,
//! and the external-metrics adapter end to end.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use autoscaler_metrics_adapter::adapter::{InMemoryCache, MetricsAdapter, ScalerHandle, ScalersEntry};
use autoscaler_metrics_adapter::scaler::factory::ScalerFactory;
use autoscaler_metrics_adapter::scaler::{MetricTarget, ScalerConfig, ScalerContext, ScalerError};
use autoscaler_metrics_adapter::MetricType;

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn trigger_config(
    trigger_type: &str,
    index: usize,
    meta: &[(&str, &str)],
    auth: &[(&str, &str)],
) -> ScalerConfig {
    ScalerConfig {
        trigger_type: trigger_type.to_string(),
        trigger_index: index,
        scalable_object_name: "orders-api".to_string(),
        scalable_object_namespace: "default".to_string(),
        scalable_object_type: "ScaledObject".to_string(),
        trigger_metadata: to_map(meta),
        auth_params: to_map(auth),
        resolved_env: BTreeMap::new(),
        pod_identity: Default::default(),
        global_http_timeout: Duration::from_secs(3),
        metric_type: None,
        as_metric_source: false,
        use_cached_metrics: false,
        trigger_unique_key: format!("test:{trigger_type}:{index}"),
    }
}

/// Mock a broker queue endpoint reporting `messages` ready messages
async fn mock_queue_backend(messages: i64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/queues/prod/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": messages })))
        .mount(&server)
        .await;
    server
}

fn queue_meta() -> Vec<(&'static str, &'static str)> {
    vec![
        ("queueName", "orders"),
        ("targetQueueSize", "10"),
        ("vhostName", "prod"),
    ]
}

// Scenario: queue-depth happy path. The backend reports 37 messages; the
// scaler advertises `s0-queue-orders` with an AverageValue(10) target and
// reports an active sample of 37.
#[tokio::test]
async fn test_queue_depth_happy_path() {
    let server = mock_queue_backend(37).await;
    let scaler = ScalerFactory::new()
        .build(trigger_config(
            "queue",
            0,
            &queue_meta(),
            &[("connection", &server.uri())],
        ))
        .await
        .unwrap();

    let ctx = ScalerContext::background();
    let specs = scaler.get_metric_spec_for_scaling(&ctx).await.unwrap();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].metric_name, "s0-queue-orders");
    assert!(matches!(
        &specs[0].target,
        MetricTarget::AverageValue(q) if q.0 == "10"
    ));

    let report = scaler
        .get_metrics_and_activity(&ctx, "s0-queue-orders")
        .await
        .unwrap();
    assert_eq!(report.samples.len(), 1);
    assert_eq!(report.samples[0].value.0, "37");
    assert!(report.active);
}

// Scenario: zero data plus a zero activation threshold stays inactive;
// activity is strictly greater-than.
#[tokio::test]
async fn test_zero_depth_with_zero_activation_is_inactive() {
    let server = mock_queue_backend(0).await;
    let mut meta = queue_meta();
    meta.push(("activationTargetQueueSize", "0"));
    let scaler = ScalerFactory::new()
        .build(trigger_config(
            "queue",
            0,
            &meta,
            &[("connection", &server.uri())],
        ))
        .await
        .unwrap();

    let report = scaler
        .get_metrics_and_activity(&ScalerContext::background(), "s0-queue-orders")
        .await
        .unwrap();
    assert_eq!(report.samples[0].value.0, "0");
    assert!(!report.active);
}

// Scenario: env indirection. `passwordFromEnv: DB_PW` binds the password
// from the resolved environment; the bound value reaches the backend as
// basic-auth credentials.
#[tokio::test]
async fn test_env_indirection_feeds_credentials() {
    let server = MockServer::start().await;
    // "admin:s3cret" base64-encoded.
    Mock::given(method("GET"))
        .and(path("/stats"))
        .and(header("authorization", "Basic YWRtaW46czNjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pending": 12 })))
        .mount(&server)
        .await;

    let mut config = trigger_config(
        "metrics-api",
        0,
        &[
            ("url", &format!("{}/stats", server.uri())),
            ("valueLocation", "pending"),
            ("targetValue", "5"),
            ("authMode", "basic"),
            ("passwordFromEnv", "DB_PW"),
        ],
        &[("username", "admin")],
    );
    config
        .resolved_env
        .insert("DB_PW".to_string(), "s3cret".to_string());

    let scaler = ScalerFactory::new().build(config).await.unwrap();
    let report = scaler
        .get_metrics_and_activity(&ScalerContext::background(), "s0-metrics-api-pending")
        .await
        .unwrap();
    assert_eq!(report.samples[0].value.0, "12");
}

// Scenario: env indirection with the variable absent fails construction,
// citing the logical field rather than the variable.
#[tokio::test]
async fn test_env_indirection_missing_variable_fails_construction() {
    let config = trigger_config(
        "metrics-api",
        0,
        &[
            ("url", "http://orders.default:8080/stats"),
            ("valueLocation", "pending"),
            ("targetValue", "5"),
            ("authMode", "basic"),
            ("passwordFromEnv", "DB_PW"),
        ],
        &[("username", "admin")],
    );
    let err = ScalerFactory::new().build(config).await.unwrap_err();
    assert!(matches!(
        err,
        ScalerError::MissingRequiredField { ref field } if field == "password"
    ));
}

// Scenario: two triggers of the same type and queue on one workload differ
// only in their index prefix.
#[tokio::test]
async fn test_multi_trigger_identifier_namespacing() {
    let server = mock_queue_backend(5).await;
    let factory = ScalerFactory::new();
    let ctx = ScalerContext::background();

    let mut names = Vec::new();
    for index in [0usize, 1] {
        let scaler = factory
            .build(trigger_config(
                "queue",
                index,
                &queue_meta(),
                &[("connection", &server.uri())],
            ))
            .await
            .unwrap();
        let specs = scaler.get_metric_spec_for_scaling(&ctx).await.unwrap();
        names.push(specs[0].metric_name.clone());
    }
    assert_eq!(names, vec!["s0-queue-orders", "s1-queue-orders"]);
}

// Scenario: cancellation during a slow query. The backend stalls for 10s;
// cancelling the context returns promptly with a cancelled error.
#[tokio::test]
async fn test_cancellation_during_slow_backend_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/queues/prod/orders"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "messages": 1 }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let mut config = trigger_config("queue", 0, &queue_meta(), &[("connection", &server.uri())]);
    config.global_http_timeout = Duration::from_secs(30);
    let scaler = ScalerFactory::new().build(config).await.unwrap();

    let ctx = ScalerContext::background();
    let query_ctx = ctx.clone();
    let scaler_for_query = Arc::clone(&scaler);
    let handle = tokio::spawn(async move {
        scaler_for_query
            .get_metrics_and_activity(&query_ctx, "s0-queue-orders")
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    ctx.cancel();
    let cancelled_at = Instant::now();
    let result = handle.await.unwrap();

    assert!(matches!(result, Err(ScalerError::Cancelled)));
    assert!(
        cancelled_at.elapsed() < Duration::from_millis(500),
        "query did not return promptly after cancellation"
    );
}

// An already-cancelled context never reaches the backend.
#[tokio::test]
async fn test_pre_cancelled_context_makes_no_backend_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/queues/prod/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": 1 })))
        .expect(0)
        .mount(&server)
        .await;

    let scaler = ScalerFactory::new()
        .build(trigger_config(
            "queue",
            0,
            &queue_meta(),
            &[("connection", &server.uri())],
        ))
        .await
        .unwrap();

    let ctx = ScalerContext::background();
    ctx.cancel();
    let result = scaler.get_metrics_and_activity(&ctx, "s0-queue-orders").await;
    assert!(matches!(result, Err(ScalerError::Cancelled)));
    // MockServer verifies expect(0) on drop.
}

#[tokio::test]
async fn test_close_is_idempotent_after_queries() {
    let server = mock_queue_backend(3).await;
    let scaler = ScalerFactory::new()
        .build(trigger_config(
            "queue",
            0,
            &queue_meta(),
            &[("connection", &server.uri())],
        ))
        .await
        .unwrap();

    let ctx = ScalerContext::background();
    scaler
        .get_metrics_and_activity(&ctx, "s0-queue-orders")
        .await
        .unwrap();
    scaler.close(&ctx).await.unwrap();
    scaler.close(&ctx).await.unwrap();
    assert!(matches!(
        scaler.get_metrics_and_activity(&ctx, "s0-queue-orders").await,
        Err(ScalerError::AlreadyClosed)
    ));
}

#[tokio::test]
async fn test_prometheus_query_produces_sample() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", "sum(rate(http_requests_total[2m]))"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    { "metric": {}, "value": [1_722_500_000.0, "42.5"] }
                ]
            }
        })))
        .mount(&server)
        .await;

    let scaler = ScalerFactory::new()
        .build(trigger_config(
            "prometheus",
            0,
            &[
                ("serverAddress", &server.uri()),
                ("query", "sum(rate(http_requests_total[2m]))"),
                ("threshold", "100"),
                ("activationThreshold", "10"),
            ],
            &[],
        ))
        .await
        .unwrap();

    let ctx = ScalerContext::background();
    let specs = scaler.get_metric_spec_for_scaling(&ctx).await.unwrap();
    let report = scaler
        .get_metrics_and_activity(&ctx, &specs[0].metric_name)
        .await
        .unwrap();
    assert_eq!(report.samples[0].value.0, "42500m");
    assert!(report.active);
}

#[tokio::test]
async fn test_prometheus_empty_result_uses_fallback_or_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "resultType": "vector", "result": [] }
        })))
        .mount(&server)
        .await;

    let meta = |ignore_nulls: &'static str| {
        vec![
            ("serverAddress", server.uri().leak() as &str),
            ("query", "up"),
            ("threshold", "1"),
            ("ignoreNullValues", ignore_nulls),
        ]
    };

    let factory = ScalerFactory::new();
    let ctx = ScalerContext::background();

    let tolerant = factory
        .build(trigger_config("prometheus", 0, &meta("true"), &[]))
        .await
        .unwrap();
    let spec_name = tolerant.get_metric_spec_for_scaling(&ctx).await.unwrap()[0]
        .metric_name
        .clone();
    let report = tolerant
        .get_metrics_and_activity(&ctx, &spec_name)
        .await
        .unwrap();
    assert_eq!(report.samples[0].value.0, "0");
    assert!(!report.active);

    let strict = factory
        .build(trigger_config("prometheus", 0, &meta("false"), &[]))
        .await
        .unwrap();
    let err = strict
        .get_metrics_and_activity(&ctx, &spec_name)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "empty-response");
}

// End to end: an external-metrics query through the adapter hits the mocked
// broker and returns the sample list.
#[tokio::test]
async fn test_adapter_resolves_and_queries_scalers() {
    let server = mock_queue_backend(21).await;
    let factory = ScalerFactory::new();
    let scaler = factory
        .build(trigger_config(
            "queue",
            0,
            &queue_meta(),
            &[("connection", &server.uri())],
        ))
        .await
        .unwrap();

    let cache = InMemoryCache::new();
    cache.upsert(ScalersEntry {
        name: "orders-api".to_string(),
        namespace: "default".to_string(),
        labels: to_map(&[("scaledobject.autoscaler/name", "orders-api")]),
        scalers: vec![ScalerHandle {
            scaler,
            trigger_index: 0,
        }],
    });
    let adapter = MetricsAdapter::new(Arc::new(cache));

    let samples = adapter
        .get_external_metric(
            &ScalerContext::background(),
            "default",
            "s0-queue-orders",
            "scaledobject.autoscaler/name=orders-api",
        )
        .await
        .unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value.0, "21");

    let err = adapter
        .get_external_metric(
            &ScalerContext::background(),
            "default",
            "s0-queue-orders",
            "scaledobject.autoscaler/name=unknown",
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not-found");
}

// Metric-type rejection applies to every registered trigger type.
#[tokio::test]
async fn test_utilization_rejected_across_registry() {
    use autoscaler_metrics_adapter::scaler::factory::SUPPORTED_TRIGGERS;

    let factory = ScalerFactory::new();
    for trigger_type in SUPPORTED_TRIGGERS {
        let mut config = trigger_config(trigger_type, 0, &[], &[]);
        config.metric_type = Some(MetricType::Utilization);
        let err = factory.build(config).await.unwrap_err();
        assert_eq!(err.kind(), "bad-value", "trigger type {trigger_type}");
    }
}
