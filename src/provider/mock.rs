//! Mock provider for testing.
//!
//! Embeddings are deterministic unit vectors seeded from the text hash,
//! chat replies are popped from a scripted queue, and reranking returns
//! candidates in input order with strictly descending scores.
use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;

use super::{ChatMessage, LlmProvider, ProviderError, RerankResult};

const MOCK_DIMENSIONS: usize = 64;

pub struct MockProvider {
    replies: Mutex<VecDeque<String>>,
    pub dimensions: usize,
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            dimensions: MOCK_DIMENSIONS,
        }
    }

    /// Create a provider that answers successive chat calls with the
    /// given payloads, in order.
    #[must_use]
    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            dimensions: MOCK_DIMENSIONS,
        }
    }

    /// Queue one more chat reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(reply.into());
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmProvider for MockProvider {
    fn chat_completion(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, ProviderError> {
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| r#"{"fields": []}"#.to_string()))
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                let bytes = hasher.finish().to_le_bytes();

                let mut embedding = Vec::with_capacity(self.dimensions);
                for i in 0..self.dimensions {
                    embedding.push(f32::from(bytes[i % 8]) / 255.0 + 0.01);
                }

                // L2 normalize
                let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
                if norm_sq > 0.0 {
                    let inv = 1.0 / norm_sq.sqrt();
                    for v in &mut embedding {
                        *v *= inv;
                    }
                }
                embedding
            })
            .collect())
    }

    fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, ProviderError> {
        Ok(documents
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(i, doc)| RerankResult {
                index: i,
                document: doc.clone(),
                score: 1.0 - i as f64 * 0.01,
            })
            .collect())
    }

    fn test_connection(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_deterministic() {
        let provider = MockProvider::new();
        let a = provider.embed_texts(&["hello".to_string()]).unwrap();
        let b = provider.embed_texts(&["hello".to_string()]).unwrap();
        assert_eq!(a, b, "same input should produce same output");
    }

    #[test]
    fn test_embed_normalized() {
        let provider = MockProvider::new();
        let vecs = provider.embed_texts(&["norm check".to_string()]).unwrap();
        let norm: f32 = vecs[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "vector should be approximately unit length, got {norm}"
        );
    }

    #[test]
    fn test_scripted_replies_in_order() {
        let provider =
            MockProvider::with_replies(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(provider.chat_completion(&[], 0.0, 10).unwrap(), "first");
        assert_eq!(provider.chat_completion(&[], 0.0, 10).unwrap(), "second");
        // Exhausted queue falls back to an empty fields object
        assert_eq!(
            provider.chat_completion(&[], 0.0, 10).unwrap(),
            r#"{"fields": []}"#
        );
    }

    #[test]
    fn test_rerank_descending_scores() {
        let provider = MockProvider::new();
        let docs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let results = provider.rerank("q", &docs, 3).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].score > results[1].score);
        assert!(results[1].score > results[2].score);
    }
}
