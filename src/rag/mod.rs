//! Retrieval-augmented answer extraction.
//!
//! Documents are chunked, embedded, and indexed; questions are answered in
//! batches by retrieving relevant chunks, optionally reranking them,
//! assembling a token-bounded context, and asking the chat model for a
//! structured JSON reply.
pub mod chunker;
pub mod context;
pub mod engine;
pub mod index;
pub mod parser;

use serde::{Deserialize, Serialize};

/// A single question to answer, taken from a form template.
#[derive(Debug, Clone)]
pub struct Question {
    /// Field identifier, e.g. `"1.1"`. Matches the template field id.
    pub id: String,
    pub text: String,
    /// Declared type hint carried through to value conversion.
    pub declared_type: String,
}

/// The answer produced for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_quote: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FieldResponse {
    /// An empty answer carrying an error message, confidence zero.
    #[must_use]
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: None,
            source_quote: None,
            confidence: 0.0,
            error: Some(message.into()),
        }
    }
}
