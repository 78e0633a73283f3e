//! End-to-end tests for the claim decision pipeline
//!
//! Drives the four-stage pipeline against a wiremock chat endpoint and an
//! in-memory vector store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use claimsense::cache::CacheService;
use claimsense::config::{CacheConfig, Config, ModelConfig, RequestConfig};
use claimsense::error::PipelineResult;
use claimsense::pipeline::{
    DecisionPipeline, DecisionStatus, DocumentChunk, EntityExtractor, VectorSearch,
};
use claimsense::ResilientModelClient;

struct MemoryStore {
    docs: Vec<DocumentChunk>,
}

#[async_trait]
impl VectorSearch for MemoryStore {
    async fn similarity_search(&self, _query: &str, k: usize) -> PipelineResult<Vec<DocumentChunk>> {
        Ok(self.docs.iter().take(k).cloned().collect())
    }
}

fn test_config() -> Config {
    Config {
        model: ModelConfig {
            api_key: "test-api-key".to_string(),
            base_url: "http://unused".to_string(),
            primary_model: "primary".to_string(),
            fallback_models: vec![],
        },
        request: RequestConfig {
            primary_timeout_ms: 5000,
            fallback_timeout_ms: 5000,
        },
        retrieval: Default::default(),
        batch: Default::default(),
        cache: CacheConfig::default(),
        logging: claimsense::config::LoggingConfig {
            level: "info".to_string(),
            format: claimsense::config::LogFormat::Pretty,
        },
    }
}

fn build_pipeline(base_url: &str, docs: Vec<DocumentChunk>) -> DecisionPipeline {
    let mut config = test_config();
    config.model.base_url = base_url.to_string();
    let client = Arc::new(
        ResilientModelClient::new(&config.model, config.request.clone())
            .expect("Failed to create client"),
    );
    let store = Arc::new(MemoryStore { docs });
    let cache = Arc::new(CacheService::new(&config.cache));
    DecisionPipeline::new(client, store, cache, &config)
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"content": content}}]})
}

fn policy_docs() -> Vec<DocumentChunk> {
    vec![
        DocumentChunk::new(
            "c0",
            "A waiting period of 24 months applies to pre-existing conditions. \
             Knee surgery is covered after the waiting period elapses.",
            "policy.pdf",
        ),
        DocumentChunk::new(
            "c1",
            "The general coverage limit is 500,000 rupees per policy year.",
            "policy.pdf",
        ),
    ]
}

#[tokio::test]
async fn test_no_documents_short_circuits_to_pending() {
    let mock_server = MockServer::start().await;

    // Entity extraction still calls the model once; the decision stage
    // must not, because there is no evidence to reason over.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"age": null, "gender": null, "location": null, "procedure": null, "policy_duration_months": 1, "intent": "claim_eligibility"}"#,
        )))
        .mount(&mock_server)
        .await;

    let pipeline = build_pipeline(&mock_server.uri(), vec![]);
    let response = pipeline.process_query("is my claim covered?").await;

    assert_eq!(response.decision, DecisionStatus::Pending);
    assert_eq!(response.confidence_score, 20);
    assert!(response.justification.contains("policy documents"));
    assert!(response.clause_mappings.is_empty());
    assert_eq!(
        response.audit_trail[1],
        "Retrieved 0 relevant policy documents."
    );
}

#[tokio::test]
async fn test_primary_decision_normalized_end_to_end() {
    let mock_server = MockServer::start().await;

    // One catch-all completion: the extraction stage tolerates the shape
    // mismatch, and the decision stage gets a fenced reply with a noisy
    // amount and an out-of-range confidence.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "```json\n{\"decision\": \"eligible\", \"amount\": \"₹5,00,000\", \
             \"justification\": \"Waiting period satisfied.\", \"confidence_score\": 120}\n```",
        )))
        .mount(&mock_server)
        .await;

    let pipeline = build_pipeline(&mock_server.uri(), policy_docs());
    let response = pipeline
        .process_query("46 year old male, knee surgery in Pune, 30 month old policy")
        .await;

    assert_eq!(response.decision, DecisionStatus::Approved);
    assert_eq!(response.amount, Some(500_000));
    assert_eq!(response.confidence_score, 100);
    assert_eq!(response.justification, "Waiting period satisfied.");
    assert_eq!(response.clause_mappings.len(), 2);
    assert!(response.clause_mappings[0].clause_text.ends_with("..."));
    assert_eq!(
        response.audit_trail[2],
        "Applied rules to make a APPROVED decision."
    );
}

#[tokio::test]
async fn test_total_model_outage_lands_on_heuristic() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&mock_server)
        .await;

    let pipeline = build_pipeline(&mock_server.uri(), policy_docs());
    let response = pipeline
        .process_query("knee surgery, 6 month old policy")
        .await;

    // Extraction fell back to regex, both model tiers failed, and the
    // heuristic saw a procedure with a mature policy.
    assert_eq!(response.decision, DecisionStatus::Pending);
    assert_eq!(response.confidence_score, 60);
    assert!(response.justification.contains("6 months"));
}

#[tokio::test]
async fn test_young_policy_heuristic_asks_for_waiting_period_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&mock_server)
        .await;

    let pipeline = build_pipeline(&mock_server.uri(), policy_docs());
    let response = pipeline
        .process_query("cataract operation, 2 month old policy")
        .await;

    assert_eq!(response.decision, DecisionStatus::Pending);
    assert_eq!(response.confidence_score, 40);
    assert!(response.justification.contains("only 2 month(s) old"));
}

#[tokio::test]
async fn test_fallback_extraction_parses_demographics() {
    let structured =
        EntityExtractor::extract_fallback("I am a 35 year old male from Mumbai");

    assert_eq!(structured.age, Some(35));
    assert_eq!(structured.gender.as_deref(), Some("male"));
    assert_eq!(structured.location.as_deref(), Some("Mumbai"));
    assert_eq!(structured.policy_duration_months, Some(1));
}

#[tokio::test]
async fn test_unparseable_extraction_reply_degrades_not_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "Sorry, I cannot extract entities from that.",
        )))
        .mount(&mock_server)
        .await;

    let pipeline = build_pipeline(&mock_server.uri(), policy_docs());
    let response = pipeline
        .process_query("35 year old female, dental treatment in Delhi, 12 month policy")
        .await;

    // The same prose reply also breaks both decision tiers, so the
    // heuristic answers using the regex-extracted fields.
    assert_eq!(response.decision, DecisionStatus::Pending);
    assert_eq!(response.confidence_score, 60);
    assert!(response.processing_time >= 0.0);
}
