//! Pipeline assembly and orchestration.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::decision::DecisionReasoner;
use super::entities::EntityExtractor;
use super::explain::ExplanationBuilder;
use super::retrieval::{EvidenceRetriever, VectorSearch};
use super::types::{DecisionResponse, DecisionStatus, QueryContext};
use crate::cache::CacheService;
use crate::config::Config;
use crate::model::ResilientModelClient;

/// The four-stage claim decision pipeline.
///
/// Stages run strictly in order: entity extraction, evidence retrieval,
/// decision reasoning, explanation building. Each stage is total, so a
/// query always produces a [`DecisionResponse`].
pub struct DecisionPipeline {
    extractor: EntityExtractor,
    retriever: EvidenceRetriever,
    reasoner: DecisionReasoner,
}

impl DecisionPipeline {
    /// Assemble the pipeline from its shared services.
    pub fn new(
        client: Arc<ResilientModelClient>,
        store: Arc<dyn VectorSearch>,
        cache: Arc<CacheService>,
        config: &Config,
    ) -> Self {
        Self {
            extractor: EntityExtractor::new(client.clone()),
            retriever: EvidenceRetriever::new(store, cache, config.retrieval.clone()),
            reasoner: DecisionReasoner::new(client),
        }
    }

    /// Process one claim query end to end.
    pub async fn process_query(&self, query: &str) -> DecisionResponse {
        let start = Instant::now();
        let mut context = QueryContext::new(query);

        context.structured_query = Some(self.extractor.extract(query).await);
        let structured = context
            .structured_query
            .clone()
            .unwrap_or_default();

        context.retrieved_docs = self.retriever.retrieve(query, &structured).await;

        let excerpts = self
            .retriever
            .build_reasoning_context(query, &context.retrieved_docs);
        let decision = self
            .reasoner
            .decide(query, &structured, &context.retrieved_docs, &excerpts)
            .await;
        context.confidence_score = decision.confidence_score;
        context.decision = Some(decision);

        context.explanation = Some(ExplanationBuilder::build(&context));

        let response = into_response(context, start.elapsed().as_secs_f64());
        info!(
            decision = %response.decision,
            confidence = response.confidence_score,
            processing_time = response.processing_time,
            "Query processed"
        );
        response
    }
}

fn into_response(context: QueryContext, elapsed_secs: f64) -> DecisionResponse {
    let decision = context.decision.unwrap_or_else(|| {
        // The reasoner is total, so this only covers future stage reshuffles.
        crate::pipeline::types::Decision::error("An unknown error occurred.")
    });
    let explanation = context.explanation.unwrap_or_default();
    DecisionResponse {
        decision: decision.decision,
        amount: decision.amount,
        justification: decision.justification,
        clause_mappings: explanation.clause_mappings,
        confidence_score: decision.confidence_score,
        processing_time: round_centis(elapsed_secs),
        audit_trail: explanation.audit_trail,
    }
}

impl DecisionResponse {
    /// An ERROR response for failures outside the pipeline itself, such
    /// as setup or ingestion problems.
    pub fn failure(message: impl std::fmt::Display, elapsed_secs: f64) -> Self {
        Self {
            decision: DecisionStatus::Error,
            amount: None,
            justification: format!("Processing failed: {message}"),
            clause_mappings: Vec::new(),
            confidence_score: 0,
            processing_time: round_centis(elapsed_secs),
            audit_trail: vec!["Error occurred during processing".to_string()],
        }
    }
}

fn round_centis(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
