//! OpenAI-compatible HTTP backend.
//!
//! Works against any endpoint exposing the OpenAI wire shape for
//! `/chat/completions` and `/embeddings`, plus the common `/rerank`
//! extension (Infomaniak, LM Studio, vLLM, TEI). Reranking tolerates the
//! two response shapes seen in the wild (`results` and `data`) and falls
//! back to embedding similarity when the endpoint rejects the request.
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ChatMessage, LlmProvider, ProviderError, RerankResult};
use crate::config::ProviderConfig;

const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:1234/v1";
const PROBE_TIMEOUT_SECS: u64 = 5;

pub struct OpenAiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    rerank_model: String,
    max_retries: u32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

impl OpenAiProvider {
    /// Create a provider from config. `require_key` enforces credentials
    /// for hosted endpoints; local endpoints may run without a key.
    pub fn new(cfg: &ProviderConfig, require_key: bool) -> Result<Self, ProviderError> {
        let base_url = if cfg.base_url.is_empty() {
            if require_key {
                return Err(ProviderError::Credentials(
                    "provider.base_url is not set".to_string(),
                ));
            }
            DEFAULT_LOCAL_BASE_URL.to_string()
        } else {
            cfg.base_url.trim_end_matches('/').to_string()
        };

        if require_key && cfg.api_key.is_empty() {
            return Err(ProviderError::Credentials(
                "provider.api_key is not set".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: cfg.api_key.clone(),
            chat_model: cfg.chat_model.clone(),
            embedding_model: cfg.embedding_model.clone(),
            rerank_model: cfg.rerank_model.clone(),
            max_retries: cfg.max_retries,
        })
    }

    /// POST a JSON payload, retrying transport failures up to
    /// `max_retries` times. HTTP error statuses are never retried.
    fn post_json(&self, path: &str, payload: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let mut last_err: Option<reqwest::Error> = None;

        for attempt in 0..=self.max_retries {
            let mut req = self.client.post(&url).json(payload);
            if !self.api_key.is_empty() {
                req = req.bearer_auth(&self.api_key);
            }

            match req.send() {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(ProviderError::Status {
                            status: status.as_u16(),
                            body: resp.text().unwrap_or_default(),
                        });
                    }
                    return Ok(resp.json()?);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        warn!("request to {url} failed (attempt {}): {e}", attempt + 1);
                    }
                    last_err = Some(e);
                }
            }
        }

        // max_retries exhausted; last_err is always set here
        Err(last_err.map_or_else(
            || ProviderError::Malformed("request loop ended without a response".to_string()),
            ProviderError::Http,
        ))
    }

    /// Rerank by cosine similarity between the query embedding and each
    /// document embedding. Used when the rerank endpoint is unavailable.
    fn rerank_by_embedding(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, ProviderError> {
        let mut all_texts = Vec::with_capacity(documents.len() + 1);
        all_texts.push(query.to_string());
        all_texts.extend_from_slice(documents);

        let embeddings = self.embed_texts(&all_texts)?;
        let query_emb = &embeddings[0];

        let mut scored: Vec<(usize, f64)> = embeddings[1..]
            .iter()
            .enumerate()
            .map(|(i, emb)| (i, f64::from(crate::rag::index::cosine_similarity(query_emb, emb))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(index, score)| RerankResult {
                index,
                document: documents[index].clone(),
                score,
            })
            .collect())
    }
}

impl LlmProvider for OpenAiProvider {
    fn chat_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        let payload = json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let raw = self.post_json("/chat/completions", &payload)?;
        let parsed: ChatResponse = serde_json::from_value(raw)
            .map_err(|e| ProviderError::Malformed(format!("chat completion: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("chat completion: empty choices".to_string()))
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let payload = json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let raw = self.post_json("/embeddings", &payload)?;
        let parsed: EmbeddingResponse = serde_json::from_value(raw)
            .map_err(|e| ProviderError::Malformed(format!("embeddings: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(ProviderError::Malformed(format!(
                "embeddings: expected {} vectors, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, ProviderError> {
        let payload = json!({
            "model": self.rerank_model,
            "query": query,
            "documents": documents,
            "top_n": top_k,
        });

        let raw = match self.post_json("/rerank", &payload) {
            Ok(v) => v,
            Err(ProviderError::Status { status, .. }) => {
                debug!("rerank endpoint returned {status}, using embedding similarity");
                return self.rerank_by_embedding(query, documents, top_k);
            }
            Err(e) => return Err(e),
        };

        let entries = raw
            .get("results")
            .or_else(|| raw.get("data"))
            .and_then(Value::as_array);

        let Some(entries) = entries else {
            // No recognizable shape: keep the original order
            return Ok(documents
                .iter()
                .take(top_k)
                .enumerate()
                .map(|(i, doc)| RerankResult {
                    index: i,
                    document: doc.clone(),
                    score: 1.0,
                })
                .collect());
        };

        Ok(entries
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(i, entry)| {
                let index = entry
                    .get("index")
                    .and_then(Value::as_u64)
                    .map_or(i, |v| v as usize)
                    .min(documents.len().saturating_sub(1));
                let score = entry
                    .get("relevance_score")
                    .or_else(|| entry.get("score"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                RerankResult {
                    index,
                    document: documents[index].clone(),
                    score,
                }
            })
            .collect())
    }

    fn test_connection(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let mut req = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS));
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        match req.send() {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> ProviderConfig {
        let mut cfg = ProviderConfig::default();
        cfg.base_url = "https://api.example.com/v1/".to_string();
        cfg.api_key = "secret".to_string();
        cfg
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = OpenAiProvider::new(&test_cfg(), true).unwrap();
        assert_eq!(provider.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_local_defaults_without_key() {
        let mut cfg = ProviderConfig::default();
        cfg.base_url = String::new();
        cfg.api_key = String::new();
        let provider = OpenAiProvider::new(&cfg, false).unwrap();
        assert_eq!(provider.base_url, DEFAULT_LOCAL_BASE_URL);
    }

    #[test]
    fn test_missing_key_rejected() {
        let mut cfg = test_cfg();
        cfg.api_key = String::new();
        assert!(matches!(
            OpenAiProvider::new(&cfg, true),
            Err(ProviderError::Credentials(_))
        ));
    }
}
