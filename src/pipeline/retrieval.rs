//! Evidence retrieval stage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::types::{DocumentChunk, StructuredQuery};
use super::{build_windowed_excerpt, score_clause_bias, truncate_str};
use crate::cache::CacheService;
use crate::config::RetrievalConfig;
use crate::error::PipelineResult;

/// Similarity search over an indexed document store.
///
/// The pipeline depends only on this trait; the concrete store (vector
/// database, in-memory index) is supplied by the embedding layer.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `k` chunks most similar to the search string.
    async fn similarity_search(&self, query: &str, k: usize) -> PipelineResult<Vec<DocumentChunk>>;
}

/// Retrieves and reranks policy evidence for a claim query.
pub struct EvidenceRetriever {
    store: Arc<dyn VectorSearch>,
    cache: Arc<CacheService>,
    config: RetrievalConfig,
}

impl EvidenceRetriever {
    /// Create a retriever over the given store and shared cache.
    pub fn new(store: Arc<dyn VectorSearch>, cache: Arc<CacheService>, config: RetrievalConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Retrieve evidence chunks, reranked by clause bias against the
    /// original query.
    ///
    /// Search failures degrade to an empty result rather than an error so
    /// the decision stage can still produce its no-evidence outcome.
    pub async fn retrieve(
        &self,
        original_query: &str,
        structured: &StructuredQuery,
    ) -> Vec<DocumentChunk> {
        let search_query = build_search_query(structured);
        info!(search_query = %search_query, "Retrieval search query");

        let docs = match self.search_cached(&search_query).await {
            Ok(docs) => docs,
            Err(e) => {
                error!(error = %e, "Retrieval failed");
                return Vec::new();
            }
        };

        // Stable sort: chunks with equal bias keep their similarity order.
        let mut ranked = docs;
        ranked.sort_by_key(|doc| {
            std::cmp::Reverse(score_clause_bias(original_query, &doc.content))
        });
        info!(count = ranked.len(), "Retrieved documents");
        ranked
    }

    async fn search_cached(&self, search_query: &str) -> PipelineResult<Vec<DocumentChunk>> {
        if let Some(hit) = self.cache.get_search(search_query) {
            return Ok(hit);
        }
        let docs = self
            .store
            .similarity_search(search_query, self.config.top_k)
            .await?;
        self.cache.put_search(search_query, docs.clone());
        Ok(docs)
    }

    /// Assemble labeled, windowed excerpts for the reasoning prompt,
    /// bounded by the total context budget.
    pub fn build_reasoning_context(&self, original_query: &str, docs: &[DocumentChunk]) -> String {
        let mut windows = Vec::new();
        let mut remaining = self.config.max_context_chars;
        for (i, doc) in docs.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            let excerpt =
                build_windowed_excerpt(original_query, &doc.content, self.config.clause_window);
            let take = truncate_str(&excerpt, remaining);
            windows.push(format!(
                "Doc {} (Source: {}):\n{}",
                i + 1,
                doc.source,
                take
            ));
            remaining -= take.len();
        }
        windows.join("\n\n")
    }
}

/// Join the structured fields into a search string.
///
/// The trailing hint keeps the search anchored on policy language even
/// when extraction found nothing.
fn build_search_query(structured: &StructuredQuery) -> String {
    let parts = [
        structured.procedure.as_deref(),
        structured.location.as_deref(),
        structured.intent.as_deref(),
        Some("insurance policy coverage"),
    ];
    parts
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    struct FakeStore {
        docs: Vec<DocumentChunk>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl VectorSearch for FakeStore {
        async fn similarity_search(
            &self,
            _query: &str,
            k: usize,
        ) -> PipelineResult<Vec<DocumentChunk>> {
            *self.calls.lock() += 1;
            Ok(self.docs.iter().take(k).cloned().collect())
        }
    }

    fn retriever_with(docs: Vec<DocumentChunk>) -> (EvidenceRetriever, Arc<FakeStore>) {
        let store = Arc::new(FakeStore {
            docs,
            calls: Mutex::new(0),
        });
        let cache = Arc::new(CacheService::new(&CacheConfig::default()));
        let retriever = EvidenceRetriever::new(
            store.clone(),
            cache,
            RetrievalConfig::default(),
        );
        (retriever, store)
    }

    #[test]
    fn test_search_query_joins_known_fields() {
        let structured = StructuredQuery {
            procedure: Some("surgery".to_string()),
            location: Some("Pune".to_string()),
            intent: Some("claim_eligibility".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build_search_query(&structured),
            "surgery Pune claim_eligibility insurance policy coverage"
        );
    }

    #[test]
    fn test_search_query_never_empty() {
        assert_eq!(
            build_search_query(&StructuredQuery::default()),
            "insurance policy coverage"
        );
    }

    #[tokio::test]
    async fn test_rerank_prefers_clause_hits() {
        let (retriever, _) = retriever_with(vec![
            DocumentChunk::new("c0", "general exclusions apply to all plans", "p.pdf"),
            DocumentChunk::new("c1", "an initial waiting period of 24 months", "p.pdf"),
        ]);
        let ranked = retriever
            .retrieve(
                "what is the waiting period for surgery",
                &StructuredQuery::default(),
            )
            .await;
        assert_eq!(ranked[0].id, "c1");
        assert_eq!(ranked[1].id, "c0");
    }

    #[tokio::test]
    async fn test_identical_search_hits_cache() {
        let (retriever, store) = retriever_with(vec![DocumentChunk::new("c0", "text", "p.pdf")]);
        let structured = StructuredQuery {
            procedure: Some("surgery".to_string()),
            ..Default::default()
        };
        retriever.retrieve("q", &structured).await;
        retriever.retrieve("q", &structured).await;
        assert_eq!(*store.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_reasoning_context_respects_budget() {
        let long = "waiting period ".repeat(200);
        let (retriever, _) = retriever_with(vec![]);
        let docs = vec![
            DocumentChunk::new("c0", long.clone(), "a.pdf"),
            DocumentChunk::new("c1", long.clone(), "b.pdf"),
            DocumentChunk::new("c2", long, "c.pdf"),
        ];
        let context = retriever.build_reasoning_context("waiting period", &docs);
        let config = RetrievalConfig::default();
        // Budget covers excerpt bytes only, labels are extra.
        let label_overhead = 3 * 40;
        assert!(context.len() <= config.max_context_chars + label_overhead);
        assert!(context.contains("Doc 1 (Source: a.pdf):"));
    }
}
