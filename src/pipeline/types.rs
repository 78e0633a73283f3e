use serde::{Deserialize, Serialize};

/// Normalized fields extracted from a free-text claim query.
///
/// Both the model path and the regex fallback produce the same field set;
/// unset fields are serialized as null rather than omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredQuery {
    /// Claimant age in years.
    pub age: Option<u32>,
    /// "male" / "female" when stated.
    pub gender: Option<String>,
    /// Title-cased city name when recognized.
    pub location: Option<String>,
    /// Procedure keyword when recognized.
    pub procedure: Option<String>,
    /// Policy age in months. The fallback path defaults this to 1.
    pub policy_duration_months: Option<u32>,
    /// Query intent, e.g. "claim_eligibility".
    pub intent: Option<String>,
}

/// Chunk-level metadata attached at ingestion time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Originating file name.
    pub source: String,
    /// Zero-based chunk position within the document.
    pub chunk_index: usize,
    /// Content type label, e.g. "text".
    pub content_type: String,
    /// Content hash of the whole document, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_hash: Option<String>,
}

/// A retrievable unit of document text.
///
/// Created by an external document processor at ingestion time and owned
/// by the vector store; the pipeline only references chunks during a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Stable chunk identifier.
    pub id: String,
    /// Plain-text content.
    pub content: String,
    /// Ingestion metadata.
    pub metadata: ChunkMetadata,
    /// Originating file name (duplicated from metadata for convenience).
    pub source: String,
    /// Embedding vector. Never serialized back to callers.
    #[serde(skip_serializing, default)]
    pub embedding: Option<Vec<f32>>,
}

impl DocumentChunk {
    /// Create a text chunk with the given id, content, and source name.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let source = source.into();
        Self {
            id: id.into(),
            content: content.into(),
            metadata: ChunkMetadata {
                source: source.clone(),
                chunk_index: 0,
                content_type: "text".to_string(),
                doc_hash: None,
            },
            source,
            embedding: None,
        }
    }

    /// Set the chunk index in the metadata.
    pub fn with_chunk_index(mut self, index: usize) -> Self {
        self.metadata.chunk_index = index;
        self
    }

    /// Set the document hash in the metadata.
    pub fn with_doc_hash(mut self, doc_hash: impl Into<String>) -> Self {
        self.metadata.doc_hash = Some(doc_hash.into());
        self
    }
}

/// Terminal decision status for a claim query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionStatus {
    /// Claim is eligible and approved.
    Approved,
    /// Claim is not eligible or denied.
    Rejected,
    /// More information is needed.
    Pending,
    /// The pipeline itself failed.
    Error,
}

impl DecisionStatus {
    /// Get the status as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Approved => "APPROVED",
            DecisionStatus::Rejected => "REJECTED",
            DecisionStatus::Pending => "PENDING",
            DecisionStatus::Error => "ERROR",
        }
    }

    /// Normalize arbitrary model output into a status.
    ///
    /// Case-insensitive token containment. Rejection tokens are checked
    /// before approval tokens because "not eligible" contains "eligible";
    /// anything unrecognized, including empty input, maps to
    /// [`DecisionStatus::Pending`].
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        if lower.is_empty() {
            return DecisionStatus::Pending;
        }

        const REJECTED: [&str; 5] = ["rejected", "reject", "denied", "deny", "not eligible"];
        const APPROVED: [&str; 4] = ["approved", "approve", "eligible", "accept"];
        const PENDING: [&str; 5] = [
            "pending",
            "further",
            "investigation",
            "information",
            "undecided",
        ];

        if REJECTED.iter().any(|w| lower.contains(w)) {
            DecisionStatus::Rejected
        } else if APPROVED.iter().any(|w| lower.contains(w)) {
            DecisionStatus::Approved
        } else if PENDING.iter().any(|w| lower.contains(w)) {
            DecisionStatus::Pending
        } else {
            DecisionStatus::Pending
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decision record produced by the reasoning stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Final status.
    pub decision: DecisionStatus,
    /// Payable amount, when one could be resolved.
    pub amount: Option<i64>,
    /// Human-readable reasoning.
    pub justification: String,
    /// Confidence, clamped to 0..=100.
    pub confidence_score: u8,
}

impl Decision {
    /// Create a pending decision with the given justification and confidence.
    pub fn pending(justification: impl Into<String>, confidence_score: u8) -> Self {
        Self {
            decision: DecisionStatus::Pending,
            amount: None,
            justification: justification.into(),
            confidence_score: confidence_score.min(100),
        }
    }

    /// Create an error decision carrying the failure text.
    pub fn error(justification: impl Into<String>) -> Self {
        Self {
            decision: DecisionStatus::Error,
            amount: None,
            justification: justification.into(),
            confidence_score: 0,
        }
    }
}

/// A cited policy clause in an explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseMapping {
    /// Leading excerpt of the cited document.
    pub clause_text: String,
    /// Source document name.
    pub source: String,
}

/// Clause citations plus the ordered audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Up to three clause citations from the retrieved documents.
    pub clause_mappings: Vec<ClauseMapping>,
    /// Human-readable processing steps.
    pub audit_trail: Vec<String>,
}

/// Externally visible result of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    /// Final status.
    pub decision: DecisionStatus,
    /// Payable amount, when resolved.
    pub amount: Option<i64>,
    /// Human-readable reasoning.
    pub justification: String,
    /// Cited clauses.
    pub clause_mappings: Vec<ClauseMapping>,
    /// Confidence, 0..=100.
    pub confidence_score: u8,
    /// Wall-clock processing time in seconds, rounded to centiseconds.
    pub processing_time: f64,
    /// Ordered human-readable steps.
    pub audit_trail: Vec<String>,
}

/// Mutable state threaded through the single-query pipeline.
///
/// Owned exclusively by one pipeline invocation and dropped when the
/// response is returned. Every stage writes its output here; the decision
/// field is guaranteed to be set once the pipeline completes, even on
/// total failure.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// The raw query text.
    pub original_query: String,
    /// Output of entity extraction.
    pub structured_query: Option<StructuredQuery>,
    /// Reranked retrieval results.
    pub retrieved_docs: Vec<DocumentChunk>,
    /// Output of decision reasoning.
    pub decision: Option<Decision>,
    /// Convenience copy of the decision confidence.
    pub confidence_score: u8,
    /// Output of explanation building.
    pub explanation: Option<Explanation>,
}

impl QueryContext {
    /// Create a fresh context for one query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            original_query: query.into(),
            ..Default::default()
        }
    }
}
