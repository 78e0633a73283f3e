//! Policy rule extraction for the fallback decision tier.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{DocumentChunk, StructuredQuery};
use super::{clean_json_response, truncate_str};
use crate::model::{GenerationOptions, ResilientModelClient};
use crate::prompts;

/// How many retrieved chunks feed rule extraction.
const RULE_EXTRACTION_DOCS: usize = 3;
/// Byte cap on the combined policy text in the extraction prompt.
const RULE_EXTRACTION_TEXT_CAP: usize = 3000;

/// A waiting-period or coverage value.
///
/// Models return either a number or a placeholder string such as
/// "as_per_policy" or "not_specified"; both shapes must deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitValue {
    /// A concrete amount or month count.
    Amount(i64),
    /// A placeholder or free-text value.
    Text(String),
}

impl LimitValue {
    /// The numeric value, if one is present or parseable.
    pub fn amount(&self) -> Option<i64> {
        match self {
            LimitValue::Amount(n) => Some(*n),
            LimitValue::Text(s) => {
                let digits: String = s.chars().filter(|c| *c != ',').collect();
                if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                    digits.parse().ok()
                } else {
                    None
                }
            }
        }
    }

    /// True for the "as_per_policy" placeholder.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, LimitValue::Text(s) if s == "as_per_policy")
    }
}

/// Waiting periods in months, by procedure class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitingPeriods {
    /// Months before major surgery is covered.
    pub major_surgery: LimitValue,
    /// Months before minor procedures are covered.
    pub minor_procedure: LimitValue,
    /// Months before preventive care is covered.
    pub preventive_care: LimitValue,
}

impl Default for WaitingPeriods {
    fn default() -> Self {
        let unspecified = || LimitValue::Text("not_specified".to_string());
        Self {
            major_surgery: unspecified(),
            minor_procedure: unspecified(),
            preventive_care: unspecified(),
        }
    }
}

/// Coverage limits by benefit category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageLimits {
    /// Daily room rent limit.
    pub room_rent: LimitValue,
    /// ICU charges limit.
    pub icu: LimitValue,
    /// Surgery benefit limit.
    pub surgery: LimitValue,
    /// Overall policy limit.
    pub general_coverage: LimitValue,
}

impl Default for CoverageLimits {
    fn default() -> Self {
        let as_per_policy = || LimitValue::Text("as_per_policy".to_string());
        Self {
            room_rent: as_per_policy(),
            icu: as_per_policy(),
            surgery: as_per_policy(),
            general_coverage: as_per_policy(),
        }
    }
}

/// Structured policy rules extracted from retrieved documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRules {
    /// Waiting periods by procedure class.
    pub waiting_periods: WaitingPeriods,
    /// Coverage limits by benefit category.
    pub coverage_limits: CoverageLimits,
    /// Excluded procedures or conditions.
    pub exclusions: Vec<String>,
    /// Special benefits or riders.
    pub special_benefits: Vec<String>,
}

impl PolicyRules {
    /// Resolve a payable amount from the coverage limits.
    ///
    /// Categories are consulted most-general first; "as_per_policy"
    /// placeholders are skipped.
    pub fn resolve_amount(&self) -> Option<i64> {
        [
            &self.coverage_limits.general_coverage,
            &self.coverage_limits.surgery,
            &self.coverage_limits.room_rent,
            &self.coverage_limits.icu,
        ]
        .into_iter()
        .filter(|limit| !limit.is_unresolved())
        .find_map(|limit| limit.amount())
    }
}

static WAITING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"waiting\s+period.*?(\d+)\s*(?:month|year)")
        .unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static AMOUNT_PATTERNS: Lazy<Vec<(Regex, AmountKey)>> = Lazy::new(|| {
    [
        (r"room\s+rent.*?(\d+(?:,\d+)*)", AmountKey::RoomRent),
        (r"icu.*?(\d+(?:,\d+)*)", AmountKey::Icu),
        (r"surgery.*?(\d+(?:,\d+)*)", AmountKey::Surgery),
        (r"coverage.*?(\d+(?:,\d+)*)", AmountKey::GeneralCoverage),
        (r"limit.*?(\d+(?:,\d+)*)", AmountKey::GeneralCoverage),
        (
            r"(\d+(?:,\d+)*)\s*(?:rs|rupees?|₹|dollars?|\$|euros?|€)",
            AmountKey::GeneralCoverage,
        ),
    ]
    .into_iter()
    .map(|(pattern, key)| {
        (
            Regex::new(pattern).unwrap_or_else(|e| panic!("invalid amount regex: {e}")),
            key,
        )
    })
    .collect()
});

#[derive(Clone, Copy)]
enum AmountKey {
    RoomRent,
    Icu,
    Surgery,
    GeneralCoverage,
}

/// Extracts [`PolicyRules`] from retrieved evidence.
///
/// The model path analyzes the top chunks; parse or transport failures
/// drop to regex heuristics over the combined text. Extraction never
/// fails outright.
pub struct PolicyRuleExtractor {
    client: Arc<ResilientModelClient>,
}

impl PolicyRuleExtractor {
    /// Create an extractor backed by the given model client.
    pub fn new(client: Arc<ResilientModelClient>) -> Self {
        Self { client }
    }

    /// Extract policy rules from the retrieved documents. Infallible.
    pub async fn extract(
        &self,
        docs: &[DocumentChunk],
        structured: &StructuredQuery,
    ) -> PolicyRules {
        let policy_text = docs
            .iter()
            .take(RULE_EXTRACTION_DOCS)
            .map(|doc| doc.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt =
            prompts::rule_extraction(structured, truncate_str(&policy_text, RULE_EXTRACTION_TEXT_CAP));

        match self.client.generate(&prompt, GenerationOptions::default()).await {
            Ok(raw) => {
                let cleaned = clean_json_response(&raw);
                match serde_json::from_str::<PolicyRules>(&cleaned) {
                    Ok(rules) => {
                        debug!(?rules, "Model rule extraction succeeded");
                        return rules;
                    }
                    Err(e) => {
                        warn!(error = %e, "Rule reply was not valid JSON, using regex fallback");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Model rule extraction failed, using regex fallback");
            }
        }
        Self::extract_fallback(docs)
    }

    /// Regex-only rule extraction over the combined lowercased text.
    pub fn extract_fallback(docs: &[DocumentChunk]) -> PolicyRules {
        let mut rules = PolicyRules::default();
        let combined = docs
            .iter()
            .map(|doc| doc.content.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        if let Some(c) = WAITING.captures(&combined) {
            if let Ok(months) = c[1].parse::<i64>() {
                rules.waiting_periods.major_surgery = LimitValue::Amount(months);
                rules.waiting_periods.minor_procedure = LimitValue::Amount(months);
            }
        }

        for (pattern, key) in AMOUNT_PATTERNS.iter() {
            let Some(c) = pattern.captures(&combined) else {
                continue;
            };
            let digits: String = c[1].chars().filter(|ch| *ch != ',').collect();
            let Ok(amount) = digits.parse::<i64>() else {
                continue;
            };
            let slot = match key {
                AmountKey::RoomRent => &mut rules.coverage_limits.room_rent,
                AmountKey::Icu => &mut rules.coverage_limits.icu,
                AmountKey::Surgery => &mut rules.coverage_limits.surgery,
                AmountKey::GeneralCoverage => &mut rules.coverage_limits.general_coverage,
            };
            // Earlier patterns win; placeholders are the only thing we overwrite.
            if slot.is_unresolved() {
                *slot = LimitValue::Amount(amount);
            }
        }

        rules
    }
}
