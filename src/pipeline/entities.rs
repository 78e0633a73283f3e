//! Entity extraction stage.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::types::StructuredQuery;
use super::clean_json_response;
use crate::model::{GenerationOptions, ResilientModelClient};
use crate::prompts;

static AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)[\s-]*(?:year|yr)s?[\s-]*old")
        .unwrap_or_else(|e| panic!("invalid age regex: {e}"))
});

static FEMALE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:female|woman|girl|f)\b").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static MALE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:male|man|boy|m)\b").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static DURATION_OLD_POLICY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)[\s-]*(?:month|year|yr)s?[\s-]*old[\s-]*policy")
        .unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static DURATION_POLICY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)[\s-]*(?:month|year|yr)s?[\s-]*policy")
        .unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static DURATION_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)[\s-]*(?:month|year|yr)s?")
        .unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static YEARS_OLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"years?[\s-]*old").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

const LOCATIONS: [&str; 7] = [
    "pune",
    "mumbai",
    "delhi",
    "chennai",
    "bangalore",
    "hyderabad",
    "kolkata",
];

const PROCEDURES: [&str; 7] = [
    "surgery",
    "treatment",
    "operation",
    "dental",
    "cataract",
    "heart",
    "knee",
];

/// Extracts structured claim fields from a free-text query.
///
/// The model path asks for a strict JSON object; any failure there, from
/// transport errors to unparseable replies, drops to a pure-regex fallback.
/// Extraction therefore never fails.
pub struct EntityExtractor {
    client: Option<Arc<ResilientModelClient>>,
}

impl EntityExtractor {
    /// Create an extractor backed by the given model client.
    pub fn new(client: Arc<ResilientModelClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Create an extractor that only uses the regex fallback.
    pub fn offline() -> Self {
        Self { client: None }
    }

    /// Extract structured fields from the query. Infallible.
    pub async fn extract(&self, query: &str) -> StructuredQuery {
        if let Some(client) = &self.client {
            let prompt = prompts::entity_extraction(query);
            match client.generate(&prompt, GenerationOptions::default()).await {
                Ok(raw) => {
                    let cleaned = clean_json_response(&raw);
                    match serde_json::from_str::<StructuredQuery>(&cleaned) {
                        Ok(structured) => {
                            debug!(?structured, "Model extraction succeeded");
                            return structured;
                        }
                        Err(e) => {
                            warn!(error = %e, "Model reply was not valid JSON, using regex fallback");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Model extraction failed, using regex fallback");
                }
            }
        }
        Self::extract_fallback(query)
    }

    /// Regex-only extraction over a lowercased copy of the query.
    pub fn extract_fallback(query: &str) -> StructuredQuery {
        let lower = query.to_lowercase();

        let age = AGE
            .captures(&lower)
            .and_then(|c| c[1].parse::<u32>().ok());

        // Female first: "female" contains "male" as a substring, and the
        // single-letter forms need word boundaries.
        let gender = if FEMALE.is_match(&lower) {
            Some("female".to_string())
        } else if MALE.is_match(&lower) {
            Some("male".to_string())
        } else {
            None
        };

        let location = LOCATIONS
            .iter()
            .find(|loc| lower.contains(*loc))
            .map(|loc| title_case(loc));

        let procedure = PROCEDURES
            .iter()
            .find(|proc| lower.contains(*proc))
            .map(|proc| proc.to_string());

        StructuredQuery {
            age,
            gender,
            location,
            procedure,
            policy_duration_months: Some(extract_policy_duration(&lower)),
            intent: Some("claim_eligibility".to_string()),
        }
    }
}

/// Policy age in months, defaulting to 1.
///
/// "N month/year old policy" wins over "N month/year policy", which wins
/// over a bare "N months" mention. A bare mention within 20 characters of
/// a "years old" phrase is treated as the claimant's age and skipped.
fn extract_policy_duration(lower: &str) -> u32 {
    for pattern in [&*DURATION_OLD_POLICY, &*DURATION_POLICY] {
        if let Some(c) = pattern.captures(lower) {
            if let Ok(n) = c[1].parse::<u32>() {
                return n;
            }
        }
    }
    if let Some(m) = DURATION_BARE.find(lower) {
        let guard_end = (m.start() + 20).min(lower.len());
        let prefix = truncated(lower, guard_end);
        if !YEARS_OLD.is_match(prefix) {
            if let Some(c) = DURATION_BARE.captures(lower) {
                if let Ok(n) = c[1].parse::<u32>() {
                    return n;
                }
            }
        }
    }
    1
}

fn truncated(text: &str, mut end: usize) -> &str {
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
