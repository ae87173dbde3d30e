use rask_log_sampler::client::{ClientConfig, ClientError, ControlPlane, HttpControlPlane};
use rask_log_sampler::domain::Severity;
use rask_log_sampler::sampler::PatternCache;
use serde_json::json;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn client_for(server: &MockServer, api_key: Option<&str>) -> HttpControlPlane {
    let config = ClientConfig {
        base_url: server.uri(),
        api_key: api_key.map(str::to_string),
        timeout: Duration::from_secs(2),
        ..Default::default()
    };
    HttpControlPlane::new(config).unwrap()
}

#[tokio::test]
async fn test_fetch_policy_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/policies/checkout"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": 12,
            "global_rate": 0.2,
            "severity_rates": {"DEBUG": 0.01, "WARNING": 0.8},
            "pattern_rates": {"0123456789abcdef0123456789abcdef": 0.05},
            "reasoning": "debug noise dominates",
            "created_at": "2024-05-01T12:00:00Z"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, Some("sk-test"));
    let policy = client.fetch_active_policy("checkout").await.unwrap().unwrap();

    assert_eq!(policy.version, 12);
    assert_eq!(policy.global_rate, 0.2);
    assert_eq!(policy.anomaly_boost, 2.0);
    assert_eq!(policy.severity_rate(Severity::Warn), Some(0.8));
    assert_eq!(
        policy.pattern_rate("0123456789abcdef0123456789abcdef"),
        Some(0.05)
    );
    assert!(policy.created_at.is_some());

    let stats = client.request_stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);
}

#[tokio::test]
async fn test_fetch_policy_not_found_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/policies/new-service"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, None);
    let policy = client.fetch_active_policy("new-service").await.unwrap();
    assert!(policy.is_none());
}

#[tokio::test]
async fn test_fetch_policy_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/policies/checkout"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, None);
    match client.fetch_active_policy("checkout").await {
        Err(ClientError::HttpError { status, .. }) => assert_eq!(status, 500),
        other => panic!("Expected HttpError, got {other:?}"),
    }
    assert_eq!(client.request_stats().failed_requests, 1);
}

#[tokio::test]
async fn test_fetch_policy_rejects_invalid_document() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/policies/checkout"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"version": 1, "global_rate": 4.0})),
        )
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, None);
    assert!(matches!(
        client.fetch_active_policy("checkout").await,
        Err(ClientError::InvalidPolicy(_))
    ));

    Mock::given(method("GET"))
        .and(path("/api/v1/policies/garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;
    assert!(matches!(
        client.fetch_active_policy("garbled").await,
        Err(ClientError::InvalidPolicy(_))
    ));
}

#[tokio::test]
async fn test_fetch_policy_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/policies/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let config = ClientConfig {
        base_url: mock_server.uri(),
        timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let client = HttpControlPlane::new(config).unwrap();

    assert!(matches!(
        client.fetch_active_policy("slow").await,
        Err(ClientError::RequestTimeout(_))
    ));
}

#[tokio::test]
async fn test_report_patterns_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/patterns/stats"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "service_name": "checkout",
            "patterns": [{
                "message_sample": "Payment 42 declined",
                "count": 2,
                "severity_distribution": {"WARN": 2}
            }]
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let cache = PatternCache::new(10);
    cache.record("sig-1", "Payment 42 declined", Severity::Warn);
    cache.record("sig-1", "Payment 43 declined", Severity::Warn);

    let client = client_for(&mock_server, Some("sk-test"));
    client
        .report_patterns("checkout", &cache.drain_all())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_report_patterns_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/patterns/stats"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let cache = PatternCache::new(10);
    cache.record("sig-1", "queue depth 7", Severity::Info);

    let client = client_for(&mock_server, None);
    let result = client.report_patterns("checkout", &cache.drain_all()).await;
    assert!(matches!(
        result,
        Err(ClientError::HttpError { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_empty_report_skips_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, None);
    client.report_patterns("checkout", &[]).await.unwrap();
}
