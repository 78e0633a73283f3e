//! Decision reasoning stage.
//!
//! Three tiers, tried in order: a direct reasoning prompt over windowed
//! excerpts, a rules-based prompt over extracted policy rules, and a
//! pure heuristic on the structured query. Every tier normalizes its
//! output, so callers always receive a well-formed [`Decision`].

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{error, info, warn};

use super::clean_json_response;
use super::rules::{PolicyRuleExtractor, PolicyRules};
use super::types::{Decision, DecisionStatus, DocumentChunk, StructuredQuery};
use crate::error::{PipelineError, PipelineResult};
use crate::model::{GenerationOptions, ResilientModelClient};
use crate::prompts;

static CURRENCY_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[₹,rs\s$€£¥]").unwrap_or_else(|e| panic!("invalid currency regex: {e}"))
});

const REQUIRED_DECISION_KEYS: [&str; 4] =
    ["decision", "justification", "amount", "confidence_score"];

/// Produces a [`Decision`] for a claim query, degrading tier by tier.
pub struct DecisionReasoner {
    client: Arc<ResilientModelClient>,
    rule_extractor: PolicyRuleExtractor,
}

impl DecisionReasoner {
    /// Create a reasoner backed by the given model client.
    pub fn new(client: Arc<ResilientModelClient>) -> Self {
        Self {
            rule_extractor: PolicyRuleExtractor::new(client.clone()),
            client,
        }
    }

    /// Decide the claim. Infallible; the heuristic tier always answers.
    ///
    /// `context_excerpts` is the budgeted, windowed evidence context built
    /// by the retrieval stage.
    pub async fn decide(
        &self,
        original_query: &str,
        structured: &StructuredQuery,
        docs: &[DocumentChunk],
        context_excerpts: &str,
    ) -> Decision {
        if docs.is_empty() {
            return Decision::pending("Could not retrieve relevant policy documents.", 20);
        }

        match self
            .primary_decision(original_query, structured, context_excerpts)
            .await
        {
            Ok(decision) => {
                info!(status = %decision.decision, "Primary reasoning produced a decision");
                return decision;
            }
            Err(e) => {
                error!(error = %e, "Primary reasoning failed, extracting policy rules");
            }
        }

        match self.rules_decision(original_query, structured, docs).await {
            Ok(decision) => {
                info!(status = %decision.decision, "Rules-based reasoning produced a decision");
                return decision;
            }
            Err(e) => {
                error!(error = %e, "Rules-based reasoning failed, applying heuristics");
            }
        }

        basic_heuristic(structured)
    }

    /// Tier 1: direct reasoning over windowed excerpts.
    async fn primary_decision(
        &self,
        original_query: &str,
        structured: &StructuredQuery,
        context_excerpts: &str,
    ) -> PipelineResult<Decision> {
        let prompt = prompts::decision_reasoning(original_query, structured, context_excerpts);
        let raw = self
            .client
            .generate(&prompt, GenerationOptions::default())
            .await?;
        parse_decision(&raw, None)
    }

    /// Tier 2: extract policy rules, then decide against them.
    async fn rules_decision(
        &self,
        original_query: &str,
        structured: &StructuredQuery,
        docs: &[DocumentChunk],
    ) -> PipelineResult<Decision> {
        let rules = self.rule_extractor.extract(docs, structured).await;
        let rules_json = serde_json::to_string(&rules)?;
        let prompt = prompts::rules_decision(original_query, structured, &rules_json);
        let raw = self
            .client
            .generate(&prompt, GenerationOptions::default())
            .await?;
        parse_decision(&raw, Some(&rules))
    }
}

/// Parse and normalize a model decision reply.
///
/// All four keys must be present. The status string is normalized, the
/// confidence clamped, and the amount coerced; when the model gave no
/// usable amount, the policy rules are consulted.
fn parse_decision(raw: &str, rules: Option<&PolicyRules>) -> PipelineResult<Decision> {
    let cleaned = clean_json_response(raw);
    if cleaned.trim().is_empty() {
        return Err(PipelineError::Parse {
            message: "no JSON content in decision reply".to_string(),
        });
    }

    let value: Value = serde_json::from_str(&cleaned)?;
    let object = value.as_object().ok_or_else(|| PipelineError::Parse {
        message: "decision reply is not a JSON object".to_string(),
    })?;
    for key in REQUIRED_DECISION_KEYS {
        if !object.contains_key(key) {
            return Err(PipelineError::MissingField {
                field: key.to_string(),
            });
        }
    }

    let status = DecisionStatus::normalize(object["decision"].as_str().unwrap_or_default());
    let justification = object["justification"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    Ok(Decision {
        decision: status,
        amount: normalize_amount(&object["amount"], rules),
        justification,
        confidence_score: normalize_confidence(&object["confidence_score"]),
    })
}

/// Coerce a model-provided amount into rupees.
///
/// Strings are stripped of currency symbols, separators, and whitespace;
/// "null" and "pending" count as absent. When the model gave nothing
/// usable, the coverage limits resolve the amount instead.
pub fn normalize_amount(value: &Value, rules: Option<&PolicyRules>) -> Option<i64> {
    let direct = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            if lower.is_empty() || lower == "null" || lower == "pending" {
                None
            } else {
                let cleaned = CURRENCY_NOISE.replace_all(s, "");
                if !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()) {
                    cleaned.parse().ok()
                } else {
                    None
                }
            }
        }
        _ => None,
    };
    direct.or_else(|| rules.and_then(PolicyRules::resolve_amount))
}

fn normalize_confidence(value: &Value) -> u8 {
    let score = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(50),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(50),
        _ => 50,
    };
    score.clamp(0, 100) as u8
}

/// Tier 3: decide from the structured query alone.
///
/// Always PENDING; the confidence encodes how much was known.
pub fn basic_heuristic(structured: &StructuredQuery) -> Decision {
    warn!("Falling back to heuristic decision");

    if structured.procedure.is_none() {
        return Decision::pending(
            "Procedure type not specified. Please provide more details about the medical procedure.",
            30,
        );
    }

    let duration = structured.policy_duration_months.unwrap_or(1);
    if duration < 3 {
        Decision::pending(
            format!(
                "Policy is only {duration} month(s) old. Please check waiting period requirements."
            ),
            40,
        )
    } else {
        Decision::pending(
            format!(
                "Policy duration ({duration} months) appears sufficient, but specific coverage details needed."
            ),
            60,
        )
    }
}
