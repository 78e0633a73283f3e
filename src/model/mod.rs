//! Multi-model LLM invocation layer.
//!
//! [`ResilientModelClient`] talks to an OpenAI-compatible chat completions
//! endpoint and degrades across an ordered list of models instead of
//! surfacing single-model failures to the pipeline.

mod client;
mod types;

pub use client::*;
pub use types::*;
