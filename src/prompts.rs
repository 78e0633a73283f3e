//! Centralized prompt definitions for the decision pipeline
//!
//! This module contains every prompt sent to the model layer. Centralizing
//! them makes the wording easier to maintain, test, and version.

use crate::pipeline::StructuredQuery;

/// Fixed instruction block for batched question answering.
pub const BATCH_ANSWER_INSTRUCTIONS: &str = "You are an expert analyst. For each question, base your response strictly on its provided context. Provide a brief answer in 1 sentence only, using verbatim language if possible. If the context does not contain the information, respond exactly with 'Not specified in the provided context.' If the answer is an identifier (e.g., Article/Section), respond with the exact identifier only (e.g., 'Article 11'). For numeric ages, return the number word only (e.g., 'Fourteen'). For yes/no questions, return 'Yes' or 'No' only if context clearly implies. Return ONLY a JSON array of answers like [\"Answer1\", \"Answer2\"]. Do not add explanations or references.";

/// The sentinel answer returned when no context or model answer is available.
pub const UNANSWERABLE_SENTINEL: &str = "Not specified in the provided context.";

/// Build the entity extraction prompt for a raw claim query.
pub fn entity_extraction(query: &str) -> String {
    format!(
        r#"You are an expert entity extractor for insurance claims. Extract the key information from the user query.
The user query is: "{query}"

Extract the following fields and respond ONLY with a valid JSON object (no markdown, no explanations):
{{
    "age": <integer or null>,
    "gender": <"male", "female", or null>,
    "location": <string or null>,
    "procedure": <string or null>,
    "policy_duration_months": <integer, null if not mentioned, assume 'new policy' is 1 month>,
    "intent": <"claim_eligibility", "coverage_inquiry", or "policy_details">
}}

IMPORTANT: Return ONLY the JSON object, no other text."#
    )
}

/// Build the primary decision-reasoning prompt over windowed excerpts.
pub fn decision_reasoning(
    query: &str,
    structured: &StructuredQuery,
    context_docs: &str,
) -> String {
    let structured_json =
        serde_json::to_string(structured).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"You are an expert insurance claims adjudicator. Based on the query and policy documents, make a decision.
Respond ONLY with a JSON object with the keys: "decision", "amount", "justification", "confidence_score".

IMPORTANT: The "decision" field must be exactly one of these values:
- "APPROVED" (if claim is eligible and approved)
- "REJECTED" (if claim is not eligible or denied)
- "PENDING" (if more information is needed to make a decision)

QUERY: {query}
STRUCTURED INFO: {structured_json}

RELEVANT POLICY CONTEXT (focused excerpts):
{context_docs}

DECISION (JSON format):"#
    )
}

/// Build the policy-rule extraction prompt over combined document text.
pub fn rule_extraction(structured: &StructuredQuery, policy_text: &str) -> String {
    let structured_json =
        serde_json::to_string(structured).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"You are an expert insurance policy analyst. Extract key policy rules and coverage information from the following policy document.

Query Context: {structured_json}

Policy Document:
{policy_text}

Extract and return ONLY a JSON object with these fields:
{{
    "waiting_periods": {{
        "major_surgery": "number of months",
        "minor_procedure": "number of months",
        "preventive_care": "number of months"
    }},
    "coverage_limits": {{
        "room_rent": "amount or 'as_per_policy'",
        "icu": "amount or 'as_per_policy'",
        "surgery": "amount or 'as_per_policy'",
        "general_coverage": "overall policy limit"
    }},
    "exclusions": ["list of excluded procedures or conditions"],
    "special_benefits": ["list of special benefits or riders"]
}}

Important:
- Extract actual amounts in the policy's currency format
- If information is not found, use "not_specified" for that field
- Focus on amounts relevant to the query context"#
    )
}

/// Build the rules-based decision prompt used by the AI fallback tier.
pub fn rules_decision(query: &str, structured: &StructuredQuery, rules_json: &str) -> String {
    let structured_json =
        serde_json::to_string(structured).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"You are an expert insurance claims adjudicator. Based on the query and policy rules, make a decision.

QUERY: {query}
STRUCTURED INFO: {structured_json}
POLICY RULES: {rules_json}

Respond ONLY with a JSON object with these exact keys:
{{
    "decision": "APPROVED|REJECTED|PENDING",
    "justification": "detailed explanation of decision",
    "amount": "specific amount in rupees (e.g., 50000) or null if not specified",
    "confidence_score": "number between 0-100"
}}

Decision Guidelines:
- APPROVED: If claim meets all policy requirements
- REJECTED: If claim clearly violates policy rules
- PENDING: If more information is needed

Amount Guidelines:
- If policy specifies coverage amount, use that exact amount
- If policy has sub-limits, use the applicable limit
- If amount is not specified, use null

Base your decision on the actual policy rules provided, not on assumptions."#
    )
}

/// Build the per-question context summarization prompt.
pub fn summarization(question: &str, context: &str) -> String {
    format!(
        "Summarize this context concisely in 200 words or less, focusing on key facts relevant to: {question}\n\nContext: {context}"
    )
}

/// Build the batched Q&A prompt from numbered questions and contexts.
pub fn batch_answers(questions: &str, contexts: &str) -> String {
    format!(
        "{BATCH_ANSWER_INSTRUCTIONS}\n\nBatched Questions:\n{questions}\n\nBatched Contexts:\n{contexts}\n\nRespond as a JSON array of answers, like: [\"Answer1\", \"Answer2\", \"Answer3\"]"
    )
}
