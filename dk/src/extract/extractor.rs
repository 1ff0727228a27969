//! HierarchyExtractor - one model call per document

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::NormalizedText;
use crate::config::LlmConfig;
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};
use crate::prompts::{DecomposeContext, PromptLoader};

/// Extraction failure before any text came back
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The model call itself failed (network, auth, rate limit, bad payload)
    #[error("Model call failed: {0}")]
    Call(#[from] LlmError),

    /// The prompt template could not be loaded or rendered
    #[error("Prompt rendering failed: {0}")]
    Prompt(String),
}

/// Asks the model to decompose a document into a task hierarchy
pub struct HierarchyExtractor {
    llm: Arc<dyn LlmClient>,
    prompts: PromptLoader,
    max_tokens: u32,
    temperature: f32,
}

impl HierarchyExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptLoader, max_tokens: u32, temperature: f32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
            temperature,
        }
    }

    pub fn from_config(llm: Arc<dyn LlmClient>, prompts: PromptLoader, config: &LlmConfig) -> Self {
        Self::new(llm, prompts, config.max_tokens, config.temperature)
    }

    /// Build the single completion request for a document
    pub fn build_request(&self, document: &NormalizedText) -> Result<CompletionRequest, ExtractError> {
        let context = DecomposeContext {
            document: document.text.clone(),
            truncated: document.truncated,
        };
        let (system_prompt, user_prompt) = self
            .prompts
            .decompose(&context)
            .map_err(|e| ExtractError::Prompt(e.to_string()))?;

        Ok(CompletionRequest {
            system_prompt,
            messages: vec![Message::user(user_prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
    }

    /// Send exactly one completion request; returns the raw model text
    pub async fn extract(&self, document: &NormalizedText) -> Result<String, ExtractError> {
        debug!(chars = document.text.len(), truncated = document.truncated, "HierarchyExtractor::extract: called");
        let request = self.build_request(document)?;

        let response = self.llm.complete(request).await?;
        info!(
            chars = response.content.len(),
            tokens = response.usage.total(),
            "Model response received"
        );
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::TextNormalizer;
    use crate::llm::client::mock::MockLlmClient;

    fn extractor(llm: Arc<MockLlmClient>) -> HierarchyExtractor {
        HierarchyExtractor::new(llm, PromptLoader::embedded_only(), 1024, 0.3)
    }

    #[tokio::test]
    async fn test_extract_single_call_with_document() {
        let llm = Arc::new(MockLlmClient::replying(r#"{"A": ["B"]}"#));
        let doc = TextNormalizer::default().normalize("Ship the login page");

        let raw = extractor(llm.clone()).extract(&doc).await.unwrap();

        assert_eq!(raw, r#"{"A": ["B"]}"#);
        assert_eq!(llm.call_count(), 1);
        let request = &llm.requests()[0];
        assert_eq!(request.messages.len(), 1);
        assert!(request.messages[0].content.contains("Ship the login page"));
        assert_eq!(request.max_tokens, 1024);
    }

    #[tokio::test]
    async fn test_extract_call_failure() {
        let llm = Arc::new(MockLlmClient::failing(401));
        let doc = TextNormalizer::default().normalize("text");

        let err = extractor(llm).extract(&doc).await.unwrap_err();
        assert!(matches!(err, ExtractError::Call(LlmError::ApiError { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_prompt_failure_makes_no_call() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("decompose-user.pmt"), "{{#each}}").unwrap();
        let llm = Arc::new(MockLlmClient::replying("{}"));
        let extractor = HierarchyExtractor::new(llm.clone(), PromptLoader::new("/nonexistent", Some(dir.path())), 10, 0.0);

        let err = extractor.extract(&TextNormalizer::default().normalize("x")).await.unwrap_err();
        assert!(matches!(err, ExtractError::Prompt(_)));
        assert_eq!(llm.call_count(), 0);
    }
}
