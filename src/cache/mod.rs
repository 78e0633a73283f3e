//! In-process memoization for retrieval and summarization.
//!
//! Holds three maps: raw similarity-search results keyed by search string,
//! windowed retrieval contexts keyed by (document hash, question), and
//! question summaries keyed the same way. All maps sit behind locks so
//! concurrent batch groups and concurrent requests can share them safely;
//! racing writers on one key compute the same value, so last-write-wins
//! is acceptable.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::CacheConfig;
use crate::pipeline::DocumentChunk;

/// Key for per-question caches: (document hash, question text).
pub type DocKey = (String, String);

/// Shared cache service for the decision pipeline and batch orchestrator.
pub struct CacheService {
    search: RwLock<HashMap<String, Vec<DocumentChunk>>>,
    retrieval: RwLock<HashMap<DocKey, String>>,
    summary: RwLock<HashMap<DocKey, String>>,
    max_entries: usize,
}

impl CacheService {
    /// Create a cache service with the given sizing.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            search: RwLock::new(HashMap::new()),
            retrieval: RwLock::new(HashMap::new()),
            summary: RwLock::new(HashMap::new()),
            max_entries: config.max_entries,
        }
    }

    /// Cached similarity-search results for an exact search string.
    pub fn get_search(&self, query: &str) -> Option<Vec<DocumentChunk>> {
        self.search.read().get(query).cloned()
    }

    /// Store similarity-search results under the exact search string.
    pub fn put_search(&self, query: &str, docs: Vec<DocumentChunk>) {
        let mut map = self.search.write();
        if map.len() >= self.max_entries {
            debug!(entries = map.len(), "Search cache at capacity, clearing");
            map.clear();
        }
        map.insert(query.to_string(), docs);
    }

    /// Cached windowed retrieval context for a (doc hash, question) pair.
    pub fn get_retrieval(&self, doc_hash: &str, question: &str) -> Option<String> {
        self.retrieval
            .read()
            .get(&(doc_hash.to_string(), question.to_string()))
            .cloned()
    }

    /// Store a windowed retrieval context.
    pub fn put_retrieval(&self, doc_hash: &str, question: &str, context: String) {
        let mut map = self.retrieval.write();
        if map.len() >= self.max_entries {
            debug!(entries = map.len(), "Retrieval cache at capacity, clearing");
            map.clear();
        }
        map.insert((doc_hash.to_string(), question.to_string()), context);
    }

    /// Cached summary for a (doc hash, question) pair.
    pub fn get_summary(&self, doc_hash: &str, question: &str) -> Option<String> {
        self.summary
            .read()
            .get(&(doc_hash.to_string(), question.to_string()))
            .cloned()
    }

    /// Store a question summary.
    pub fn put_summary(&self, doc_hash: &str, question: &str, summary: String) {
        let mut map = self.summary.write();
        if map.len() >= self.max_entries {
            debug!(entries = map.len(), "Summary cache at capacity, clearing");
            map.clear();
        }
        map.insert((doc_hash.to_string(), question.to_string()), summary);
    }
}
