//! Single-query claim decision pipeline.
//!
//! A query flows through four stages in a fixed order: entity extraction,
//! evidence retrieval, decision reasoning, and explanation building. Each
//! stage reads and writes a shared [`QueryContext`]; the pipeline never
//! panics on model failure, it degrades tier by tier until a heuristic
//! produces a decision.

mod decision;
mod engine;
mod entities;
mod explain;
mod retrieval;
mod rules;
mod types;

pub use decision::*;
pub use engine::*;
pub use entities::*;
pub use explain::*;
pub use retrieval::*;
pub use rules::*;
pub use types::*;

use once_cell::sync::Lazy;
use regex::Regex;

/// Clause categories and the keywords that signal them.
///
/// Used to bias retrieval ranking toward chunks that discuss the clause
/// categories the query mentions.
pub static CLAUSE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "waiting period",
        &["waiting period", "cooling period", "initial waiting"],
    ),
    ("pre-existing", &["pre-existing", "ped"]),
    ("maternity", &["maternity", "pregnancy", "childbirth"]),
    ("cataract", &["cataract"]),
    ("organ donor", &["organ donor", "donor expenses"]),
    ("no claim", &["no claim discount", "ncd"]),
    ("preventive", &["preventive", "health check"]),
    ("hospital", &["hospital", "inpatient"]),
    ("ayush", &["ayush", "ayurveda", "homeopathy", "siddha", "unani"]),
    ("room rent", &["room rent", "icu charges", "sub-limit"]),
];

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| {
    // (?s) so the greedy span crosses newlines inside the object.
    Regex::new(r"(?s)\{.*\}").unwrap_or_else(|e| panic!("invalid JSON span regex: {e}"))
});

static QUERY_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9_]{4,}").unwrap_or_else(|e| panic!("invalid query word regex: {e}"))
});

/// Strip markdown fences and surrounding prose from a model reply,
/// keeping the widest JSON object span.
///
/// Idempotent for replies containing at most one top-level object.
/// Returns the cleaned remainder even when no object is found, so the
/// caller's JSON parse produces the error.
pub fn clean_json_response(raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();

    let Some(start) = text.find('{') else {
        return text.to_string();
    };
    match JSON_OBJECT.find(&text[start..]) {
        Some(m) => m.as_str().to_string(),
        None => text[start..].to_string(),
    }
}

/// Count clause-keyword hits shared between the query and a chunk.
///
/// Only categories the query itself mentions contribute; for those, each
/// keyword found in the chunk adds one.
pub fn score_clause_bias(query: &str, chunk_text: &str) -> usize {
    let query_lower = query.to_lowercase();
    let chunk_lower = chunk_text.to_lowercase();

    let mut score = 0;
    for (_category, keywords) in CLAUSE_KEYWORDS {
        if keywords.iter().any(|kw| query_lower.contains(kw)) {
            score += keywords
                .iter()
                .filter(|kw| chunk_lower.contains(*kw))
                .count();
        }
    }
    score
}

/// Cut a focused excerpt out of a long chunk.
///
/// Finds the first occurrence of any query word of four or more
/// characters and keeps a window of `window` bytes centered on it. When
/// no query word occurs, keeps the leading `window` bytes instead.
pub fn build_windowed_excerpt(query: &str, text: &str, window: usize) -> String {
    if text.len() <= window {
        return text.to_string();
    }

    let text_lower = text.to_lowercase();
    let query_lower = query.to_lowercase();

    let mut position = None;
    for word in QUERY_WORD.find_iter(&query_lower) {
        if let Some(p) = text_lower.find(word.as_str()) {
            position = Some(p);
            break;
        }
    }

    match position {
        Some(p) => {
            // Lowercasing can shift byte offsets for non-ASCII text;
            // clamping keeps the slice valid either way.
            let start = floor_char_boundary(text, p.saturating_sub(window / 2));
            let end = floor_char_boundary(text, (p + window / 2).min(text.len()));
            text[start..end].to_string()
        }
        None => truncate_str(text, window).to_string(),
    }
}

/// Truncate to at most `max_bytes`, never splitting a character.
pub fn truncate_str(text: &str, max_bytes: usize) -> &str {
    &text[..floor_char_boundary(text, max_bytes)]
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_strips_fences_and_prose() {
        let raw = "Sure, here is the result:\n```json\n{\"decision\": \"APPROVED\"}\n```";
        assert_eq!(clean_json_response(raw), "{\"decision\": \"APPROVED\"}");
    }

    #[test]
    fn test_clean_keeps_widest_object() {
        let raw = "prefix {\"a\": {\"b\": 1}} suffix }";
        // Greedy span runs to the last closing brace.
        assert_eq!(clean_json_response(raw), "{\"a\": {\"b\": 1}} suffix }");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let raw = "```json\n{\"x\": [1, 2]}\n```";
        let once = clean_json_response(raw);
        assert_eq!(clean_json_response(&once), once);
    }

    #[test]
    fn test_clean_without_object_returns_remainder() {
        assert_eq!(clean_json_response("  no json here  "), "no json here");
        // Empty and whitespace-only inputs pass through unchanged.
        assert_eq!(clean_json_response(""), "");
        assert_eq!(clean_json_response("  \n "), "  \n ");
    }

    #[test]
    fn test_clause_bias_requires_query_mention() {
        let chunk = "An initial waiting period of 24 months applies to pre-existing conditions.";
        assert!(score_clause_bias("What is the waiting period for PED?", chunk) > 0);
        // Query about maternity gets no credit for waiting-period text.
        assert_eq!(score_clause_bias("Is maternity covered?", chunk), 0);
    }

    #[test]
    fn test_windowed_excerpt_centers_on_match() {
        let filler = "x".repeat(600);
        let text = format!("{filler} the waiting period is 24 months {filler}");
        let excerpt = build_windowed_excerpt("what is the waiting period", &text, 400);
        assert!(excerpt.contains("waiting period"));
        assert!(excerpt.len() <= 401);
    }

    #[test]
    fn test_windowed_excerpt_short_text_passes_through() {
        let text = "short clause";
        assert_eq!(build_windowed_excerpt("anything", text, 400), text);
    }

    #[test]
    fn test_windowed_excerpt_no_match_takes_head() {
        let text = "a".repeat(1000);
        let excerpt = build_windowed_excerpt("zzzz", &text, 400);
        assert_eq!(excerpt.len(), 400);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "₹₹₹₹"; // each rupee sign is 3 bytes
        let cut = truncate_str(text, 4);
        assert_eq!(cut, "₹");
    }
}
