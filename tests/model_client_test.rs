//! Integration tests for the resilient model client
//!
//! Tests the primary/fallback ladder against a wiremock chat endpoint.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use claimsense::config::{ModelConfig, RequestConfig};
use claimsense::error::ModelError;
use claimsense::model::{GenerationOptions, ResilientModelClient};

/// Create a test client pointing to the mock server
fn create_test_client(base_url: &str) -> ResilientModelClient {
    let config = ModelConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        primary_model: "primary".to_string(),
        fallback_models: vec!["fallback-1".to_string(), "fallback-2".to_string()],
    };
    let request_config = RequestConfig {
        primary_timeout_ms: 5000,
        fallback_timeout_ms: 5000,
    };
    ResilientModelClient::new(&config, request_config).expect("Failed to create client")
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"content": content}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

#[tokio::test]
async fn test_primary_success_skips_fallbacks() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({"model": "primary"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Approved")))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "fallback-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("unused")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let result = client.generate("decide", GenerationOptions::default()).await;

    assert_eq!(result.unwrap(), "Approved");
}

#[tokio::test]
async fn test_primary_failure_uses_first_working_fallback() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "primary"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "fallback-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello")))
        .expect(1)
        .mount(&mock_server)
        .await;

    // The second fallback must never be consulted.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "fallback-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("unused")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let result = client.generate("decide", GenerationOptions::default()).await;

    assert_eq!(result.unwrap(), "Hello");
}

#[tokio::test]
async fn test_empty_completion_falls_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "primary"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("   ")))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "fallback-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Real answer")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let result = client.generate("decide", GenerationOptions::default()).await;

    assert_eq!(result.unwrap(), "Real answer");
}

#[tokio::test]
async fn test_all_models_failing_exhausts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let result = client.generate("decide", GenerationOptions::default()).await;

    match result {
        Err(ModelError::Exhausted {
            message,
            models_tried,
        }) => {
            assert_eq!(models_tried, 3);
            assert!(message.contains("503"), "message: {message}");
        }
        other => panic!("Expected Exhausted, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_rate_limit_surfaces_through_exhaustion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let err = client
        .generate("decide", GenerationOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_rate_limited(), "expected rate-limited error: {err}");
}

#[tokio::test]
async fn test_malformed_payload_falls_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "primary"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "fallback-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Recovered")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let result = client.generate("decide", GenerationOptions::default()).await;

    assert_eq!(result.unwrap(), "Recovered");
}
