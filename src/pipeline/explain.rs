//! Explanation building stage.

use super::truncate_str;
use super::types::{ClauseMapping, DocumentChunk, Explanation, QueryContext};

/// How many retrieved chunks become clause citations.
const MAX_CLAUSE_MAPPINGS: usize = 3;
/// Byte cap on each cited excerpt.
const CLAUSE_EXCERPT_BYTES: usize = 200;

/// Builds the clause citations and audit trail for a decided query.
///
/// Pure and infallible; it only reads what earlier stages wrote.
pub struct ExplanationBuilder;

impl ExplanationBuilder {
    /// Build an explanation from the context's docs and decision.
    pub fn build(context: &QueryContext) -> Explanation {
        let decision_text = context
            .decision
            .as_ref()
            .map(|d| d.decision.as_str())
            .unwrap_or("unknown");

        Explanation {
            clause_mappings: context
                .retrieved_docs
                .iter()
                .take(MAX_CLAUSE_MAPPINGS)
                .map(clause_mapping)
                .collect(),
            audit_trail: vec![
                "Extracted key entities from query.".to_string(),
                format!(
                    "Retrieved {} relevant policy documents.",
                    context.retrieved_docs.len()
                ),
                format!("Applied rules to make a {decision_text} decision."),
            ],
        }
    }
}

fn clause_mapping(doc: &DocumentChunk) -> ClauseMapping {
    ClauseMapping {
        clause_text: format!("{}...", truncate_str(&doc.content, CLAUSE_EXCERPT_BYTES)),
        source: doc.source.clone(),
    }
}
