//! LLM client module
//!
//! One trait ([`LlmClient`]) with two HTTP backends: OpenAI-compatible chat
//! completions (OpenAI, Groq) and Ollama.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod ollama;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Supports "openai" and "groq" (both OpenAI-compatible) and "ollama".
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" | "groq" => {
            debug!("create_client: creating OpenAI-compatible client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        "ollama" => {
            debug!("create_client: creating Ollama client");
            Ok(Arc::new(OllamaClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::Config(format!(
                "Unknown LLM provider: '{}'. Supported: openai, groq, ollama",
                other
            )))
        }
    }
}
