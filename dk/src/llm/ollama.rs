//! Ollama client (local models, no API key)
//!
//! Uses the single-prompt `/api/generate` endpoint with `stream: false`; the
//! system prompt goes in the `system` field.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, TokenUsage};
use crate::config::LlmConfig;

/// Ollama API client
pub struct OllamaClient {
    base_url: String,
    model: String,
    http: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            http,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.base_url, "OllamaClient::from_config: called");
        Self::new(&config.base_url, &config.model, Duration::from_millis(config.timeout_ms))
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> GenerateRequest<'a> {
        // /api/generate takes one prompt; join the user turns
        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        GenerateRequest {
            model: &self.model,
            system: &request.system_prompt,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(%url, model = %self.model, "OllamaClient::complete: called");

        let start = std::time::Instant::now();
        let response = self
            .http
            .post(&url)
            .json(&self.build_request(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Unavailable(format!("Cannot connect to Ollama at {}. Is Ollama running?", self.base_url))
                } else {
                    LlmError::Network(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message });
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        info!("Ollama response received in {:.1}s", start.elapsed().as_secs_f64());

        Ok(CompletionResponse {
            content: generated.response,
            usage: TokenUsage {
                input_tokens: generated.prompt_eval_count,
                output_tokens: generated.eval_count,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    #[test]
    fn test_build_request() {
        let client = OllamaClient::new("http://localhost:11434/", "gemma3:1b", Duration::from_secs(5)).unwrap();
        let request = CompletionRequest {
            system_prompt: "planner".to_string(),
            messages: vec![Message::user("doc text")],
            max_tokens: 1024,
            temperature: 0.3,
        };

        let body = serde_json::to_value(client.build_request(&request)).unwrap();

        assert_eq!(body["model"], "gemma3:1b");
        assert_eq!(body["system"], "planner");
        assert_eq!(body["prompt"], "doc text");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 1024);
        assert_eq!(client.base_url, "http://localhost:11434");
    }
}
