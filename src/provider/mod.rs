//! LLM provider trait and shared types.
//!
//! The pipeline consumes inference services through a narrow capability
//! contract: chat completion, text embedding, document reranking, and a
//! connectivity probe. Backends are selected by a config string.
pub mod mock;
pub mod openai;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderConfig;

/// Errors that can occur while talking to an inference provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("missing credentials: {0}")]
    Credentials(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// One chat message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A reranked document with its relevance score.
#[derive(Debug, Clone)]
pub struct RerankResult {
    pub index: usize,
    pub document: String,
    pub score: f64,
}

/// Capability contract for inference backends.
///
/// All calls are blocking I/O bounded by the client timeout configured at
/// construction. Implementations must be `Send + Sync`.
pub trait LlmProvider: Send + Sync {
    /// Generate a chat completion and return the assistant message text.
    fn chat_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ProviderError>;

    /// Embed texts into vectors, one per input, in input order.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Rerank documents by relevance to the query, best first.
    fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, ProviderError>;

    /// Probe connectivity. Never blocks longer than a few seconds.
    fn test_connection(&self) -> bool;
}

/// Build a provider from configuration.
pub fn create_provider(cfg: &ProviderConfig) -> Result<Box<dyn LlmProvider>, ProviderError> {
    match cfg.kind.as_str() {
        "openai" => Ok(Box::new(openai::OpenAiProvider::new(cfg, true)?)),
        "local" => Ok(Box::new(openai::OpenAiProvider::new(cfg, false)?)),
        "mock" => Ok(Box::new(mock::MockProvider::new())),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
