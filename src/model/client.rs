use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::{ChatMessage, ChatRequest, ChatResponse, GenerationOptions};
use crate::config::{ModelConfig, RequestConfig};
use crate::error::{ModelError, ModelResult};

/// Multi-model chat client that survives individual model failures.
///
/// The primary model is tried exactly once with a short timeout. If it
/// errors, times out, or returns an empty completion, the fallbacks are
/// tried in order with a longer timeout. The first non-empty completion
/// wins. [`ModelError::Exhausted`] is raised only when every model fails.
#[derive(Clone)]
pub struct ResilientModelClient {
    client: Client,
    base_url: String,
    api_key: String,
    primary_model: String,
    fallback_models: Vec<String>,
    request_config: RequestConfig,
}

impl ResilientModelClient {
    /// Create a new client from model and request configuration
    pub fn new(config: &ModelConfig, request_config: RequestConfig) -> ModelResult<Self> {
        // Per-attempt timeouts are set on each request, not on the client,
        // because primary and fallback attempts use different budgets.
        let client = Client::builder().build().map_err(ModelError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            primary_model: config.primary_model.clone(),
            fallback_models: config.fallback_models.clone(),
            request_config,
        })
    }

    /// Generate a completion for the prompt, falling back across models.
    pub async fn generate(&self, prompt: &str, options: GenerationOptions) -> ModelResult<String> {
        let primary_timeout = Duration::from_millis(self.request_config.primary_timeout_ms);
        let fallback_timeout = Duration::from_millis(self.request_config.fallback_timeout_ms);

        let mut models_tried = 1usize;

        debug!(model = %self.primary_model, "Trying primary model");
        let mut last_error = match self
            .execute_request(&self.primary_model, prompt, options, primary_timeout)
            .await
        {
            Ok(content) => {
                info!(model = %self.primary_model, "Primary model produced content");
                return Ok(content);
            }
            Err(e) => {
                warn!(
                    model = %self.primary_model,
                    error = %e,
                    "Primary model failed, switching to fallbacks"
                );
                e
            }
        };

        for fallback in &self.fallback_models {
            debug!(model = %fallback, "Trying fallback model");
            models_tried += 1;
            match self
                .execute_request(fallback, prompt, options, fallback_timeout)
                .await
            {
                Ok(content) => {
                    info!(model = %fallback, "Fallback model produced content");
                    return Ok(content);
                }
                Err(e) => {
                    warn!(model = %fallback, error = %e, "Fallback model failed");
                    last_error = e;
                }
            }
        }

        Err(ModelError::Exhausted {
            message: last_error.to_string(),
            models_tried,
        })
    }

    /// Execute a single chat completion request (internal)
    async fn execute_request(
        &self,
        model: &str,
        prompt: &str,
        options: GenerationOptions,
        timeout: Duration,
    ) -> ModelResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    ModelError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| ModelError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })?;

        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ModelError::Empty {
                model: model.to_string(),
            });
        }

        debug!(
            model = %model,
            latency_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "Model call succeeded"
        );

        Ok(content)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the primary model identifier
    pub fn primary_model(&self) -> &str {
        &self.primary_model
    }

    /// Get the ordered fallback model identifiers
    pub fn fallback_models(&self) -> &[String] {
        &self.fallback_models
    }
}
