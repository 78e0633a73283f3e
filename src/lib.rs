//! # Claimsense
//!
//! A resilient LLM decision pipeline for insurance claim eligibility,
//! with batched document question answering on the side.
//!
//! ## Features
//!
//! - **Entity Extraction**: Structured claim fields from free text, with
//!   a regex fallback when the model path fails
//! - **Evidence Retrieval**: Cached similarity search with clause-keyword
//!   reranking and windowed excerpts
//! - **Tiered Decision Reasoning**: Direct reasoning, rules-based
//!   reasoning, then pure heuristics; a query always gets a decision
//! - **Explanations**: Clause citations and a human-readable audit trail
//! - **Resilient Model Access**: Primary model plus ordered fallbacks
//!   over an OpenAI-compatible API
//! - **Batched Q&A**: Concurrent question batches with caching, backoff
//!   on rate limits, and sentinel degradation
//!
//! ## Architecture
//!
//! ```text
//! Query → Entity Extraction → Evidence Retrieval → Decision Reasoning → Explanation
//!                                    ↓                     ↓
//!                              Cache (shared)     Model Client (primary + fallbacks)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use claimsense::{Config, DecisionPipeline, ResilientModelClient};
//! use claimsense::cache::CacheService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = Arc::new(ResilientModelClient::new(&config.model, config.request.clone())?);
//!     let cache = Arc::new(CacheService::new(&config.cache));
//!     let pipeline = DecisionPipeline::new(client, store, cache, &config);
//!     let response = pipeline.process_query("46M, knee surgery in Pune, 3-month policy").await;
//!     println!("{}", response.decision);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Batched document Q&A orchestration.
pub mod batch;
/// Shared in-process caches for retrieval and summarization.
pub mod cache;
/// Configuration management.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Multi-model LLM invocation layer.
pub mod model;
/// The single-query claim decision pipeline.
pub mod pipeline;
/// Prompt templates for every model invocation.
pub mod prompts;

pub use batch::BatchQAOrchestrator;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use model::ResilientModelClient;
pub use pipeline::{DecisionPipeline, DecisionResponse};
