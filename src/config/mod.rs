use std::env;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Model endpoint and fallback ladder.
    pub model: ModelConfig,
    /// Per-call request behavior.
    pub request: RequestConfig,
    /// Evidence retrieval tuning.
    pub retrieval: RetrievalConfig,
    /// Batch Q&A orchestration tuning.
    pub batch: BatchConfig,
    /// In-process cache sizing.
    pub cache: CacheConfig,
    /// Logging output.
    pub logging: LoggingConfig,
}

/// Model API configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Bearer token for the OpenAI-compatible endpoint.
    pub api_key: String,
    /// Base URL of the chat completions API.
    pub base_url: String,
    /// Model tried exactly once before falling back.
    pub primary_model: String,
    /// Ordered fallback model identifiers.
    pub fallback_models: Vec<String>,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Timeout for the single primary-model attempt.
    pub primary_timeout_ms: u64,
    /// Timeout for each fallback-model attempt.
    pub fallback_timeout_ms: u64,
}

/// Evidence retrieval configuration
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// How many chunks the single-query pipeline asks the store for.
    pub top_k: usize,
    /// Character window taken around the first matching query term.
    pub clause_window: usize,
    /// Global character budget for concatenated excerpts.
    pub max_context_chars: usize,
    /// Contexts shorter than this are treated as unanswerable.
    pub min_context_chars: usize,
    /// Average-score threshold above which batch contexts are summarized.
    pub summary_score_threshold: f64,
    /// Characters of raw context fed into a summarization prompt.
    pub summary_input_cap: usize,
}

/// Batch Q&A configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Questions per group.
    pub batch_size: usize,
    /// Overall timeout for a standard group's model call.
    pub standard_timeout_ms: u64,
    /// Overall timeout for a complex group's model call.
    pub complex_timeout_ms: u64,
    /// Rate-limit retry budget for standard groups.
    pub standard_max_retries: u32,
    /// Rate-limit retry budget for complex groups.
    pub complex_max_retries: u32,
    /// Base of the exponential backoff, in seconds. The wait before retry
    /// `n` is `base * 2^n`.
    pub backoff_base_secs: u64,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry cap per cache map; a map is cleared when it would exceed this.
    pub max_entries: usize,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "claimsense=debug".
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let model = ModelConfig {
            api_key: env::var("MODEL_API_KEY").map_err(|_| AppError::Config {
                message: "MODEL_API_KEY is required".to_string(),
            })?,
            base_url: env::var("MODEL_BASE_URL")
                .unwrap_or_else(|_| "https://api.aimlapi.com/v1".to_string()),
            primary_model: env::var("PRIMARY_MODEL")
                .unwrap_or_else(|_| "openai/gpt-4o-mini".to_string()),
            fallback_models: env::var("FALLBACK_MODELS")
                .unwrap_or_else(|_| "openai/gpt-4o,openai/gpt-3.5-turbo".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let request = RequestConfig {
            primary_timeout_ms: env_parse("PRIMARY_TIMEOUT_MS", 30_000),
            fallback_timeout_ms: env_parse("FALLBACK_TIMEOUT_MS", 60_000),
        };

        let retrieval = RetrievalConfig {
            top_k: env_parse("RETRIEVAL_TOP_K", 4),
            clause_window: env_parse("CLAUSE_WINDOW_CHARS", 400),
            max_context_chars: env_parse("MAX_CONTEXT_CHARS", 1500),
            min_context_chars: env_parse("MIN_CONTEXT_CHARS", 50),
            summary_score_threshold: env_parse("SUMMARY_SCORE_THRESHOLD", 1.1),
            summary_input_cap: env_parse("SUMMARY_INPUT_CAP", 2000),
        };

        let batch = BatchConfig {
            batch_size: env_parse("BATCH_SIZE", 5),
            standard_timeout_ms: env_parse("BATCH_TIMEOUT_MS", 20_000),
            complex_timeout_ms: env_parse("BATCH_COMPLEX_TIMEOUT_MS", 30_000),
            standard_max_retries: env_parse("BATCH_MAX_RETRIES", 2),
            complex_max_retries: env_parse("BATCH_COMPLEX_MAX_RETRIES", 3),
            backoff_base_secs: env_parse("BATCH_BACKOFF_BASE_SECS", 5),
        };

        let cache = CacheConfig {
            max_entries: env_parse("CACHE_MAX_ENTRIES", 4096),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            model,
            request,
            retrieval,
            batch,
            cache,
            logging,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            primary_timeout_ms: 30_000,
            fallback_timeout_ms: 60_000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            clause_window: 400,
            max_context_chars: 1500,
            min_context_chars: 50,
            summary_score_threshold: 1.1,
            summary_input_cap: 2000,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            standard_timeout_ms: 20_000,
            complex_timeout_ms: 30_000,
            standard_max_retries: 2,
            complex_max_retries: 3,
            backoff_base_secs: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 4096 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_config_defaults() {
        let config = RequestConfig::default();
        assert_eq!(config.primary_timeout_ms, 30_000);
        assert_eq!(config.fallback_timeout_ms, 60_000);
    }

    #[test]
    fn test_batch_config_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.backoff_base_secs, 5);
        assert!(config.complex_timeout_ms > config.standard_timeout_ms);
        assert!(config.complex_max_retries > config.standard_max_retries);
    }

    #[test]
    fn test_retrieval_config_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.clause_window, 400);
        assert_eq!(config.max_context_chars, 1500);
        assert!(config.min_context_chars < config.max_context_chars);
    }
}
