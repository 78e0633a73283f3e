use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong.
        message: String,
    },

    /// A model invocation failed past every fallback.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// A pipeline stage failed in a way its fallbacks could not absorb.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Anything else.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

/// Errors from the multi-model invocation layer
#[derive(Debug, Error)]
pub enum ModelError {
    /// The primary model and every fallback failed or returned nothing.
    #[error("no model produced content: {message} (models tried: {models_tried})")]
    Exhausted {
        /// Last underlying failure.
        message: String,
        /// How many models were attempted.
        models_tried: usize,
    },

    /// The API returned a non-success status. A 429 status here is how
    /// callers detect rate limiting.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body from the API.
        message: String,
    },

    /// The API answered but the payload was not usable.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// What was wrong with the payload.
        message: String,
    },

    /// A single model call exceeded its timeout.
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The model answered with an empty or whitespace-only completion.
    #[error("Empty response from model {model}")]
    Empty {
        /// Which model returned nothing.
        model: String,
    },
}

/// Errors inside the decision pipeline and batch orchestrator
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model output could not be parsed as the expected JSON shape.
    #[error("Parse failure: {message}")]
    Parse {
        /// What failed to parse.
        message: String,
    },

    /// A required key was missing from a structured model response.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The absent key.
        field: String,
    },

    /// The vector store returned an error.
    #[error("Retrieval failed: {message}")]
    Retrieval {
        /// Store-side failure description.
        message: String,
    },

    /// A model invocation inside a stage failed past every fallback.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Whether this error indicates API rate limiting.
    ///
    /// The batch orchestrator retries with backoff only on these.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ModelError::Api { status, .. } => *status == 429,
            ModelError::Exhausted { message, .. } => message.contains("429"),
            _ => false,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for model invocations
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type alias for pipeline stages
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::Exhausted {
            message: "connection refused".to_string(),
            models_tried: 5,
        };
        assert_eq!(
            err.to_string(),
            "no model produced content: connection refused (models tried: 5)"
        );

        let err = ModelError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = ModelError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");

        let err = ModelError::Empty {
            model: "gpt-4o-mini".to_string(),
        };
        assert_eq!(err.to_string(), "Empty response from model gpt-4o-mini");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::Parse {
            message: "expected object".to_string(),
        };
        assert_eq!(err.to_string(), "Parse failure: expected object");

        let err = PipelineError::MissingField {
            field: "decision".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required field: decision");

        let err = PipelineError::Retrieval {
            message: "store unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "Retrieval failed: store unavailable");
    }

    #[test]
    fn test_rate_limit_detection() {
        let err = ModelError::Api {
            status: 429,
            message: "quota exceeded".to_string(),
        };
        assert!(err.is_rate_limited());

        let err = ModelError::Api {
            status: 500,
            message: "server error".to_string(),
        };
        assert!(!err.is_rate_limited());

        // The message check mirrors substring detection on wrapped errors.
        let err = ModelError::Exhausted {
            message: "API error: 429 - quota".to_string(),
            models_tried: 5,
        };
        assert!(err.is_rate_limited());

        let err = ModelError::Timeout { timeout_ms: 1000 };
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn test_model_error_conversion_to_app_error() {
        let model_err = ModelError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = model_err.into();
        assert!(matches!(app_err, AppError::Model(_)));
    }

    #[test]
    fn test_pipeline_error_conversion_to_app_error() {
        let pipe_err = PipelineError::Parse {
            message: "bad json".to_string(),
        };
        let app_err: AppError = pipe_err.into();
        assert!(matches!(app_err, AppError::Pipeline(_)));
        assert!(app_err.to_string().contains("Parse failure"));
    }
}
